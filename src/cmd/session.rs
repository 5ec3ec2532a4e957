use crate::cmd::progress::{create_spinner, finish_spinner_error, finish_spinner_success};
use crate::config::{ConfigManager, Resource, TenantConfig};
use crate::error::Result;
use crate::graph::auth::GraphAuth;
use crate::graph::directory::GraphDirectory;
use crate::graph::exchange::ExchangeClient;
use crate::graph::GraphClient;
use crate::onprem::PowerShellActiveDirectory;
use crate::services::Backends;

/// Authenticated backends for one command invocation
pub struct Session {
    pub tenant: TenantConfig,
    directory: GraphDirectory,
    exchange: ExchangeClient,
    on_prem: PowerShellActiveDirectory,
}

impl Session {
    /// Acquire Graph and Exchange tokens for the tenant; any failure here is fatal
    pub async fn connect(config_manager: &ConfigManager, tenant_hint: Option<&str>) -> Result<Self> {
        let tenant = config_manager.resolve_tenant(tenant_hint)?;
        let spinner = create_spinner(&format!("Connecting to tenant '{}'...", tenant.name));

        let auth = GraphAuth::new(config_manager.clone());
        let tokens = async {
            let graph = auth.get_access_token(&tenant, Resource::Graph).await?;
            let exchange = auth.get_access_token(&tenant, Resource::Exchange).await?;
            Ok::<_, crate::error::Error>((graph, exchange))
        }
        .await;

        let (graph_token, exchange_token) = match tokens {
            Ok(tokens) => tokens,
            Err(e) => {
                finish_spinner_error(&spinner, &format!("Could not connect to '{}'", tenant.name));
                return Err(e);
            }
        };
        finish_spinner_success(&spinner, &format!("Connected to '{}'", tenant.name));
        tracing::info!(tenant = %tenant.name, tenant_id = %tenant.tenant_id, "Session established");

        Ok(Self {
            directory: GraphDirectory::new(GraphClient::new(graph_token)),
            exchange: ExchangeClient::new(exchange_token, &tenant.tenant_id, tenant.organization.as_deref()),
            on_prem: PowerShellActiveDirectory::new(),
            tenant,
        })
    }

    pub fn backends(&self) -> Backends<'_> {
        Backends {
            directory: &self.directory,
            mailboxes: &self.exchange,
            on_prem: &self.on_prem,
        }
    }
}
