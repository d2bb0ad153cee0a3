//! Example: Connect to a base unit and print events as they arrive.

use lifesos_lan_bridge::{BaseUnit, BaseUnitConfig, BaseUnitEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = BaseUnitConfig::builder()
        .host("192.168.1.100")
        .port(1680)
        .password("")
        .build();

    let unit = BaseUnit::new(config);
    let mut events = unit.subscribe();
    unit.start();

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BaseUnitEvent::DeviceAdded { device_id } => {
                    println!("Device added: {:06x}", device_id);
                }
                BaseUnitEvent::DeviceChanged { device_id, changes } => {
                    println!("Device {:06x} changed: {:?}", device_id, changes);
                }
                BaseUnitEvent::DeviceEvent {
                    device_id,
                    event_code,
                } => {
                    println!("Device {:06x} event: {:?}", device_id, event_code);
                }
                BaseUnitEvent::Event(contact_id) => println!("{}", contact_id),
                BaseUnitEvent::PropertiesChanged { changes } => {
                    println!("Base unit changed: {:?}", changes);
                }
                other => println!("{:?}", other),
            }
        }
    });

    println!("Press Ctrl+C to disconnect...");
    tokio::signal::ctrl_c().await?;
    unit.stop().await;
    printer.abort();
    println!("Disconnected.");

    Ok(())
}
