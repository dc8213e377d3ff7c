//! Example: Connect to a DS-AIR gateway and print rooms and climate units.

use dsair_bridge::{DsAirGateway, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::builder()
        .host("192.168.1.110")
        .port(8008)
        .build();

    println!("Connecting to gateway...");
    let mut gateway = DsAirGateway::connect(config).await?;
    gateway.wait_ready().await?;
    println!("Protocol: {:?}", gateway.protocol_version().await);

    // Print rooms
    let rooms = gateway.rooms().await;
    println!("\n--- Rooms ({}) ---", rooms.len());
    for room in &rooms {
        println!(
            "  Room {:5}: {:20} icon={} aircon={} hd={}",
            room.id,
            room.display_name(),
            room.icon,
            room.air_con.is_some(),
            room.hd_room,
        );
    }

    // Print climate units
    let aircons = gateway.aircons().await;
    println!("\n--- Units ({}) ---", aircons.len());
    for ac in &aircons {
        println!(
            "  {:24} {:20} power={:?} mode={:?} set={:?} current={:?} fan={:?}",
            ac.unique_id(),
            ac.display_name(),
            ac.status.switch,
            ac.status.mode,
            ac.status.target_celsius(),
            ac.status.current_celsius(),
            ac.fan_volume,
        );
    }

    println!("\nPress Ctrl+C to disconnect...");
    tokio::signal::ctrl_c().await?;
    gateway.disconnect().await?;
    println!("Disconnected.");

    Ok(())
}
