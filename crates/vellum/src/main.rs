use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::Path;
use vellum_lib::cli::commands::{Cli, Commands, ConfigAction};
use vellum_lib::model::{ids, Ace, Acl, AclPropagation, BaseType, ContentStream, VersioningState};
use vellum_lib::view::ViewOptions;
use vellum_lib::{
    CallContext, CheckInRequest, CreateRequest, RepositoryRegistry, RepositoryService,
    VellumConfig,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger with specified or default log level
    let env = match cli.log_level {
        Some(ref log_level) => Env::default().filter_or("RUST_LOG", log_level),
        None => Env::default().filter_or("RUST_LOG", "info"),
    };
    env_logger::init_from_env(env);

    let config_path = cli.config.clone().unwrap_or_else(VellumConfig::default_path);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config_path)?,
            ConfigAction::Init { path, force } => {
                cmd_config_init(path.as_deref().unwrap_or(&config_path), force)?
            }
        },
        Commands::Demo { repository, user } => {
            cmd_demo(&config_path, repository.as_deref(), &user)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<VellumConfig> {
    VellumConfig::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))
}

/// Print the effective configuration
fn cmd_config_show(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} (not found, showing defaults)", path.display());
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Write the default configuration
fn cmd_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow::anyhow!(
            "Configuration already exists: {:?}\nUse --force to overwrite it",
            path
        ));
    }
    VellumConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write configuration to {:?}", path))?;
    info!("Wrote default configuration to {:?}", path);
    println!("✓ Configuration written to {}", path.display());
    Ok(())
}

/// Build a small tree in memory and print it with effective ACLs
fn cmd_demo(path: &Path, repository: Option<&str>, user: &str) -> Result<()> {
    let config = load_config(path)?;
    let registry =
        RepositoryRegistry::from_config(&config).context("Failed to open repositories")?;
    let repository_id = match repository {
        Some(id) => id.to_string(),
        None => registry
            .ids()
            .next()
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("No repository configured"))?,
    };
    let service = registry
        .get(&repository_id)
        .with_context(|| format!("Unknown repository: {}", repository_id))?;
    let ctx = CallContext::new(user);
    let root = service.root_folder_id().to_string();

    let projects = service
        .create(&ctx, CreateRequest::new("cmis:folder", "projects").in_folder(&root))
        .context("Failed to create folder")?;
    let private = service
        .create(&ctx, CreateRequest::new("cmis:folder", "private").in_folder(&projects.id))
        .context("Failed to create folder")?;
    service
        .apply_acl(
            &ctx,
            &private.id,
            &[Ace::new(user, ["cmis:all"])],
            AclPropagation::Propagate,
            Some(false),
        )
        .context("Failed to apply ACL")?;

    let readme = service
        .create(
            &ctx,
            CreateRequest::new("cmis:document", "readme.txt")
                .in_folder(&projects.id)
                .with_stream(ContentStream::new("text/plain", "first draft"))
                .with_versioning_state(VersioningState::Major),
        )
        .context("Failed to create document")?;
    let pwc = service.check_out(&ctx, &readme.id).context("Failed to check out")?;
    service
        .check_in(
            &ctx,
            &pwc.id,
            CheckInRequest::minor()
                .with_stream(ContentStream::new("text/plain", "second draft"))
                .with_comment("demo edit"),
            Some(&pwc.revision_token),
        )
        .context("Failed to check in")?;
    service
        .create(&ctx, CreateRequest::new("cmis:document", "notes.txt").in_folder(&private.id))
        .context("Failed to create document")?;

    println!("Repository {} as {}", service.id(), user);
    println!("/ {}", format_acl(&service.get_acl(&ctx, &root)?));
    print_tree(&service, &ctx, &root, 1)?;
    Ok(())
}

fn print_tree(
    service: &RepositoryService,
    ctx: &CallContext,
    folder_id: &str,
    depth: usize,
) -> Result<()> {
    for child in service.get_children(ctx, folder_id, &ViewOptions::default())? {
        let name = child.name().unwrap_or("?");
        let label = child
            .properties
            .get_str(ids::VERSION_LABEL)
            .map(|l| format!(" v{}", l))
            .unwrap_or_default();
        let acl = service.get_acl(ctx, &child.id)?;
        println!(
            "{}{} [{}]{} {}",
            "  ".repeat(depth),
            name,
            child.base_type,
            label,
            format_acl(&acl)
        );
        if child.base_type == BaseType::Folder {
            print_tree(service, ctx, &child.id, depth + 1)?;
        }
    }
    Ok(())
}

fn format_acl(acl: &Acl) -> String {
    let entries: Vec<String> = acl
        .aces
        .iter()
        .map(|ace| {
            let permissions: Vec<&str> = ace.permissions.iter().map(String::as_str).collect();
            let origin = if ace.direct { "" } else { " (inherited)" };
            format!("{}={}{}", ace.principal_id, permissions.join("+"), origin)
        })
        .collect();
    format!("{{{}}}", entries.join(", "))
}
