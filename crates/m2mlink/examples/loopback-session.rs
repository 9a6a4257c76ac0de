//! Session against an in-process echo server.
//!
//! Run with: `cargo run -p m2mlink --example loopback-session`

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use m2mlink::frame::{Frame, DATA};
use m2mlink::net::{Connection, ConnectionConfig, ProtocolLayer};
use m2mlink::transport::{Endpoint, TcpDialer};

struct Printer(mpsc::Sender<Frame>);

impl ProtocolLayer for Printer {
    fn on_frame(&self, frame: &Frame) {
        let _ = self.0.send(frame.clone());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let endpoint = Endpoint::new("127.0.0.1", listener.local_addr()?.port());

    thread::spawn(move || -> std::io::Result<()> {
        let (mut conn, _) = listener.accept()?;
        let mut header = [0u8; 2];
        conn.read_exact(&mut header)?;
        let mut client_id = vec![0u8; usize::from(header[1])];
        conn.read_exact(&mut client_id)?;
        println!("server: ident from {}", String::from_utf8_lossy(&client_id));

        // Echo 1-byte sized frames back unchanged.
        loop {
            conn.read_exact(&mut header)?;
            let mut payload = vec![0u8; usize::from(header[1])];
            conn.read_exact(&mut payload)?;
            conn.write_all(&header)?;
            conn.write_all(&payload)?;
        }
    });

    let (frames, inbound) = mpsc::channel();
    let config = ConnectionConfig::new(vec![endpoint], "loopback-demo");
    let connection = Connection::new(config, TcpDialer::new(), Printer(frames))?;

    for text in ["first", "second", "third"] {
        connection.send(DATA, text.as_bytes())?;
    }
    connection.start()?;

    for _ in 0..3 {
        let frame = inbound.recv_timeout(Duration::from_secs(5))?;
        println!(
            "client: type=0x{:02x} payload={}",
            frame.frame_type(),
            String::from_utf8_lossy(frame.payload())
        );
    }

    connection.shutdown();
    Ok(())
}
