mod logs;
mod server;

use std::sync::Arc;

use avrconfig::get_config;
use avrcontrol::{AvrConfigExt, router_from_config};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();
    logs::init_logging(&config);

    // ========== Configuration ==========
    let router = router_from_config(&config)?;
    let endpoint = router.endpoint().clone();
    info!(
        "🎛️ Receiver at {}:{} ({} appliance(s), discovery token policy {:?})",
        endpoint.host,
        endpoint.port,
        router.registry().len(),
        config.get_discovery_token_policy()?
    );
    for appliance in router.registry().list_appliances() {
        info!("  - {} ({})", appliance.friendly_name, appliance.appliance_id);
    }

    // ========== Démarrage du serveur ==========
    let app = server::app(Arc::new(router));
    server::serve(app, config.get_http_port()).await?;

    info!("AVRSkill stopped");
    Ok(())
}
