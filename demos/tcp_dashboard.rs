//! Connect to a plant monitor over TCP and print its readings.
//!
//! ```text
//! cargo run --example tcp_dashboard -- 192.168.4.1:8080 [ssid password]
//! RUST_LOG=plantmon_link=debug cargo run --example tcp_dashboard -- 127.0.0.1:9000
//! ```

use std::sync::Arc;

use plantmon_link::protocol::ReadingKind;
use plantmon_link::transport::{connect_tcp, DEFAULT_CONNECT_TIMEOUT};
use plantmon_link::{ConnectionContext, Session};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "192.168.4.1:8080".to_string());
    let credentials = args.next().zip(args.next());

    let stream = connect_tcp(addr.as_str(), DEFAULT_CONNECT_TIMEOUT).await?;
    let context = Arc::new(ConnectionContext::new());
    let mut session = Session::builder().start(stream, context.clone());

    if let Some((ssid, password)) = credentials {
        let joined = session.provision_wifi(&ssid, &password).await?;
        println!("wifi {}: {}", ssid, if joined { "joined" } else { "not joined" });
    }

    let mut status = context.subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            println!("status: {:?}", current);
        }
    });

    let mut readings = session.observer();
    loop {
        tokio::select! {
            reading = readings.next_reading() => match reading {
                Some(r) if r.kind == ReadingKind::Live => {
                    println!("{:?}: {:.2}", r.sensor, r.value.as_f64());
                }
                Some(r) => println!("{:?} {:?}: {:.2}", r.sensor, r.kind, r.value.as_f64()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                session.shutdown();
                break;
            }
        }
    }

    session.wait_for_shutdown().await?;
    Ok(())
}
