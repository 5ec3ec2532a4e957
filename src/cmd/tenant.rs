use crate::config::{ConfigManager, Resource, TenantConfig};
use crate::error::Result;
use crate::graph::auth::REQUIRED_SCOPES;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct TenantAddArgs {
    /// Tenant name
    name: String,

    /// Tenant ID (Entra ID tenant ID)
    #[arg(long)]
    tenant_id: String,

    /// Client ID (Application ID)
    #[arg(long)]
    client_id: String,

    /// Client secret for the app-only client credentials flow
    #[arg(long)]
    client_secret: String,

    /// Primary domain (contoso.onmicrosoft.com), used to anchor Exchange requests
    #[arg(long)]
    organization: Option<String>,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
pub struct TenantListArgs {
    /// Show detailed information
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
pub struct TenantSwitchArgs {
    /// Tenant name to switch to
    name: String,
}

#[derive(Args, Debug)]
pub struct TenantRemoveArgs {
    /// Tenant name to remove
    name: String,
}

pub async fn add(args: TenantAddArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    let tenant = TenantConfig {
        name: args.name.clone(),
        tenant_id: args.tenant_id,
        client_id: args.client_id,
        client_secret: Some(args.client_secret),
        organization: args.organization,
        description: args.description,
    };

    config_manager.add_tenant(tenant)?;

    let config = config_manager.load_config()?;
    if config.current_tenant.is_none() {
        config_manager.set_active_tenant(&args.name)?;
    }

    println!("{} Tenant '{}' added successfully", "✓".green(), args.name);
    println!(
        "\n{} The app registration needs these application permissions: {}",
        "→".cyan(),
        REQUIRED_SCOPES.join(", ").bold()
    );

    Ok(())
}

pub async fn list(args: TenantListArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let tenants = config_manager.load_tenants()?;
    let config = config_manager.load_config()?;

    if tenants.is_empty() {
        println!("{} No tenants configured", "!".yellow());
        println!(
            "\n{} Run {} or drop a tenants.env into {}",
            "→".cyan(),
            "offboard365 tenant add".bold(),
            config_manager.config_dir().display()
        );
        return Ok(());
    }

    println!("\n{}", "Configured Tenants:".bold());
    println!("{}", "─".repeat(60));

    for tenant in &tenants {
        let is_current = config
            .current_tenant
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(&tenant.name));
        let marker = if is_current {
            "●".green()
        } else {
            "○".dimmed()
        };

        println!("\n{} {}", marker, tenant.name.bold());

        if args.verbose {
            println!("  Tenant ID:    {}", tenant.tenant_id);
            println!("  Client ID:    {}", tenant.client_id);
            if let Some(org) = &tenant.organization {
                println!("  Organization: {}", org);
            }
            if let Some(desc) = &tenant.description {
                println!("  Description:  {}", desc);
            }

            for (label, resource) in [("Graph", Resource::Graph), ("Exchange", Resource::Exchange)] {
                match config_manager.load_token(&tenant.name, resource) {
                    Ok(token) => println!(
                        "  {:<13} {} (expires: {})",
                        format!("{}:", label),
                        "Token cached".green(),
                        token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                    ),
                    Err(_) => println!("  {:<13} {}", format!("{}:", label), "No cached token".yellow()),
                }
            }
        }
    }

    println!("\n{}", "─".repeat(60));
    println!("{} {} tenant(s) total", "→".cyan(), tenants.len());

    if let Some(current) = &config.current_tenant {
        println!("{} Active: {}", "→".cyan(), current.bold());
    }

    Ok(())
}

pub async fn switch(args: TenantSwitchArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    // Pulls the tenant in from env files if it is not registered yet
    let tenant = config_manager.get_tenant_or_env(&args.name)?;
    config_manager.set_active_tenant(&tenant.name)?;

    println!("{} Switched to tenant '{}'", "✓".green(), tenant.name);

    Ok(())
}

pub async fn remove(args: TenantRemoveArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    config_manager.remove_tenant(&args.name)?;

    println!("{} Tenant '{}' removed", "✓".green(), args.name);

    Ok(())
}
