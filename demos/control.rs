//! Example: Switch the first unit on in heat mode at 22 C and wait for the ack.

use dsair_bridge::{AirConStatus, DsAirGateway, GatewayConfig, Mode, Switch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::builder()
        .host("192.168.1.110")
        .command_timeout_ms(3000)
        .build();

    let mut gateway = DsAirGateway::connect(config).await?;
    gateway.wait_ready().await?;

    let Some(ac) = gateway.aircons().await.into_iter().next() else {
        println!("No climate units found");
        gateway.disconnect().await?;
        return Ok(());
    };

    let status = AirConStatus {
        switch: Some(Switch::On),
        mode: Some(Mode::Heat),
        setted_temp: Some(220),
        ..Default::default()
    };

    println!("Sending control to {} ({})...", ac.display_name(), ac.key());
    match gateway.control_confirmed(ac.key(), status).await {
        Ok(()) => println!("Acknowledged"),
        Err(e) => println!("Control failed: {}", e),
    }

    if let Some(ac) = gateway.aircon(&ac.key()).await {
        println!("Local status now: {:?}", ac.status);
    }

    gateway.disconnect().await?;
    Ok(())
}
