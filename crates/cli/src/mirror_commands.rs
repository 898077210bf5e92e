//! CLI commands for git mirror management.

use {clap::Subcommand, skillshelf_skills::Catalog};

use crate::print_json;

#[derive(Subcommand)]
pub enum MirrorAction {
    /// List configured mirrors.
    List,
    /// Add a mirror and clone it.
    Add {
        /// Git URL (https, ssh, git@host:path or file).
        url: String,
    },
    /// Remove a mirror and delete its working copy.
    Remove { url: String },
    /// Show a disabled mirror's skills again.
    Enable { url: String },
    /// Hide a mirror's skills without deleting them.
    Disable { url: String },
    /// Pull one mirror, or every enabled mirror when no URL is given.
    Sync { url: Option<String> },
}

pub async fn handle_mirror(catalog: &Catalog, action: MirrorAction) -> anyhow::Result<()> {
    match action {
        MirrorAction::List => {
            print_json(&catalog.list_mirrors().await)?;
        },
        MirrorAction::Add { url } => {
            let mirror = catalog.add_mirror(&url).await?;
            print_json(&mirror)?;
        },
        MirrorAction::Remove { url } => {
            let mirror = catalog.remove_mirror(&url).await?;
            eprintln!("Removed mirror '{}' ({}).", mirror.name, mirror.url);
        },
        MirrorAction::Enable { url } => {
            print_json(&catalog.set_mirror_enabled(&url, true).await?)?;
        },
        MirrorAction::Disable { url } => {
            print_json(&catalog.set_mirror_enabled(&url, false).await?)?;
        },
        MirrorAction::Sync { url: Some(url) } => {
            let status = catalog.sync_mirror(&url).await?;
            print_json(&serde_json::json!({ "url": url, "status": status }))?;
        },
        MirrorAction::Sync { url: None } => {
            let report = catalog.sync_all().await?;
            print_json(&report)?;
            if report.failed() > 0 {
                anyhow::bail!("{} of {} mirrors failed to sync", report.failed(), report.outcomes.len());
            }
        },
    }

    Ok(())
}
