// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Scans, connects to the first peripheral whose name contains the given filter, then reads
//! every readable characteristic and prints notifications for a few seconds.
//!
//! ```text
//! cargo run --example console --features serde,mock -- [name filter] [config.toml]
//! ```
//!
//! Set `BLE_SESSION_MOCK=1` to run against a scripted in-memory peripheral instead of the
//! system's Bluetooth stack. `BLE_SESSION_SERVICE=fff0` (short or full form) limits the scan
//! to peripherals advertising that service.

use anyhow::{anyhow, Context};
use ble_session::api::bleuuid::{parse_uuid, uuid_from_u16};
use ble_session::api::{CharPropFlags, Transport};
use ble_session::encoding::Payload;
use ble_session::mock::{MockPeripheral, MockTransport};
use ble_session::registry::Capability;
use ble_session::session::{Session, SessionEvent};
use ble_session::SessionConfig;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::time;

fn load_config(path: Option<String>) -> anyhow::Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path))
}

fn scripted() -> MockTransport {
    let service = uuid_from_u16(0xfff0);
    let (rx, tx) = (uuid_from_u16(0xfff1), uuid_from_u16(0xfff2));
    let transport = MockTransport::new();
    let device = MockPeripheral::new("mock-mt60")
        .name("MT60 (mock)")
        .service(
            service,
            [
                (rx, CharPropFlags::READ | CharPropFlags::NOTIFY),
                (tx, CharPropFlags::WRITE),
            ],
        )
        .value(service, rx, b"ready");
    transport.add_peripheral(device);

    let advertiser = transport.clone();
    tokio::spawn(async move {
        loop {
            time::sleep(Duration::from_millis(500)).await;
            advertiser.advertise(&"mock-mt60".into());
        }
    });
    transport
}

async fn run<T: Transport>(transport: T, config: SessionConfig, filter: &str) -> anyhow::Result<()> {
    let session = Session::new(transport, config);
    let mut events = session.events();

    println!("Adapter: {:?}", session.adapter_state().await?);
    session.scan().await?;
    while let Some(event) = events.next().await {
        match event {
            SessionEvent::PeripheralDiscovered(p) => {
                println!("  {} {:?} rssi {:?}", p.id, p.local_name, p.rssi)
            }
            SessionEvent::ScanStopped { .. } => break,
            _ => {}
        }
    }

    let target = session
        .peripherals()
        .into_iter()
        .find(|p| p.local_name.as_deref().unwrap_or("").contains(filter))
        .ok_or_else(|| anyhow!("no peripheral named like {:?}", filter))?;
    println!("Connecting to {}", target.id);
    session.connect(&target.id).await?;

    let registry = session.registry();
    for capability in Capability::ALL {
        for (index, characteristic) in registry.list(capability).iter().enumerate() {
            println!("{} #{}: {}", capability, index, characteristic);
        }
    }
    for index in 0..registry.len(Capability::Read) {
        match session.read(index).await {
            Ok(text) => println!("read #{}: {:?}", index, text),
            Err(e) => eprintln!("read #{} failed: {}", index, e),
        }
    }

    let subscription = if registry.len(Capability::Notify) > 0 {
        Some(
            session
                .notify(0, |n| println!("notification {}: {}", n.characteristic, n.hex()))
                .await?,
        )
    } else {
        None
    };
    if registry.len(Capability::WriteWithResponse) > 0 {
        session.write(0, Payload::text("hello")).await?;
        println!("wrote: {:?}", session.buffers().last_written);
    }

    time::sleep(Duration::from_secs(5)).await;
    if let Some(subscription) = subscription {
        subscription.cancel().await?;
    }
    session.disconnect().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let filter = args.next().unwrap_or_default();
    let mut config = load_config(args.next())?;
    if let Ok(service) = std::env::var("BLE_SESSION_SERVICE") {
        let service = parse_uuid(&service).with_context(|| format!("service {:?}", service))?;
        config.scan_filter.services.push(service);
    }

    if std::env::var_os("BLE_SESSION_MOCK").is_some() {
        return run(scripted(), config, &filter).await;
    }
    #[cfg(target_os = "linux")]
    {
        let transport = ble_session::platform::PlatformTransport::new().await?;
        run(transport, config, &filter).await
    }
    #[cfg(not(target_os = "linux"))]
    {
        println!("No native transport here; using the scripted peripheral.");
        run(scripted(), config, &filter).await
    }
}
