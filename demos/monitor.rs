//! Connects to a receiver, sends any commands given on the command line and
//! prints state changes until Ctrl-C.
//!
//! ```text
//! cargo run --example monitor                      # discover
//! cargo run --example monitor -- 192.168.1.40      # direct
//! cargo run --example monitor -- 192.168.1.40 source:tv volume:20
//! ```

use sony_av::{AvReceiver, Command, DeviceEndpoint, ReceiverConfig, ReceiverError};
use std::net::IpAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut args = std::env::args().skip(1).peekable();
    let config = ReceiverConfig::default();

    let direct = args.peek().and_then(|arg| arg.parse::<IpAddr>().ok());
    let mut receiver = match direct {
        Some(ip) => {
            args.next();
            AvReceiver::connect(DeviceEndpoint::from_ip(ip), config)
        }
        None => {
            println!("Searching for receiver...");
            AvReceiver::discover(config).await?
        }
    };
    println!("Receiver at {}", receiver.endpoint());

    let mut changes = receiver.subscribe();

    for arg in args {
        let command: Command = arg.parse()?;
        println!("Sending {:?}", command);
        receiver.send(command).await?;
    }

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    println!("{:<24} {}", format!("{:?}", change.kind), change.display_text);
                    println!("{:<24} {}", "", receiver.state().status_label());
                }
                Err(ReceiverError::ChannelError(e)) => eprintln!("{}", e),
                Err(e) => {
                    eprintln!("Change stream ended: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    receiver.shutdown().await;
    Ok(())
}
