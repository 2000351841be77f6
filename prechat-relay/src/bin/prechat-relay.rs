#[macro_use]
extern crate log;

use prechat_relay::{apis::Api, config, webhook};

use std::{net::SocketAddr, sync::Arc};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    info!("Prechat relay is booting up, please standby...");

    info!("Reading configuration");
    let config = config::configure()?;

    let server_address: SocketAddr = config.webhook_server.listen_address.parse()?;

    info!("Configuring the VBout API client");
    let api = Arc::new(Api::new(config.apis)?);

    let routes = webhook::routes(api, config.webhook_server);

    info!("Webhook server listening on {server_address}");
    warp::serve(routes).run(server_address).await;

    Ok(())
}
