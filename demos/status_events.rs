//! Example: Register status hooks and print every gateway event.

use dsair_bridge::{DsAirGateway, GatewayConfig, GatewayEvent, HookUpdate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::builder().host("192.168.1.110").build();

    let mut gateway = DsAirGateway::connect(config).await?;
    let mut events = gateway.subscribe();
    gateway.wait_ready().await?;

    for ac in gateway.aircons().await {
        let name = ac.display_name().to_string();
        gateway
            .register_status_hook(ac.key(), move |update| match update {
                HookUpdate::Status(status) => {
                    println!("{}: power={:?} set={:?}", name, status.switch, status.target_celsius())
                }
                HookUpdate::AirCon(ac) => println!("{}: capabilities updated ({:?})", name, ac.fan_volume),
            })
            .await;
    }

    println!("Listening for status events (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(GatewayEvent::StatusChanged { key, changed, .. }) => {
                        println!("Unit {} changed: {:?}", key, changed);
                    }
                    Ok(GatewayEvent::Disconnected) => {
                        println!("Gateway disconnected!");
                        break;
                    }
                    Ok(event) => {
                        println!("Event: {:?}", event);
                    }
                    Err(e) => {
                        println!("Event channel error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    gateway.disconnect().await?;
    Ok(())
}
