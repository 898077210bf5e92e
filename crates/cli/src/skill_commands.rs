//! CLI commands for reading and editing skills.

use std::path::PathBuf;

use {
    anyhow::Context,
    serde_json::json,
    skillshelf_skills::{Catalog, Encoding, NewSkill, Skill},
};

use crate::{Commands, print_json};

fn summary(skill: &Skill) -> serde_json::Value {
    json!({
        "id": skill.id,
        "name": skill.metadata.name,
        "description": skill.metadata.description,
        "read_only": skill.read_only,
    })
}

pub async fn handle_skill(catalog: &Catalog, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List => {
            let skills = catalog.list_skills().await?;
            let entries: Vec<_> = skills.iter().map(summary).collect();
            print_json(&entries)?;
        },
        Commands::Show { id } => {
            let skill = catalog.read_skill(&id).await?;
            print_json(&skill)?;
        },
        Commands::Search { query } => {
            let hits = catalog.search_skills(&query).await?;
            let entries: Vec<_> = hits.iter().map(summary).collect();
            print_json(&entries)?;
        },
        Commands::Resources { id } => {
            let resources = catalog.list_resources(&id).await?;
            print_json(&resources)?;
        },
        Commands::Cat { id, path } => {
            let content = catalog.read_resource(&id, &path).await?;
            match content.encoding {
                Encoding::Utf8 => print!("{}", content.content),
                Encoding::Base64 => print_json(&content)?,
            }
        },
        Commands::Export { id, output } => {
            let bytes = catalog.export_skill(&id).await?;
            let output = output.unwrap_or_else(|| default_archive_name(&id));
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            eprintln!("Exported '{id}' to {} ({} bytes)", output.display(), bytes.len());
        },
        Commands::Import { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let name = catalog.import_skill(bytes).await?;
            print_json(&json!({ "id": name }))?;
        },
        Commands::Create {
            name,
            description,
            body_file,
        } => {
            let body = match body_file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => String::new(),
            };
            let skill = catalog
                .create_skill(NewSkill {
                    name,
                    description,
                    body,
                    ..Default::default()
                })
                .await?;
            print_json(&summary(&skill))?;
        },
        Commands::Delete { id } => {
            catalog.delete_skill(&id).await?;
            eprintln!("Deleted skill '{id}'.");
        },
        Commands::Mirror { .. } | Commands::Watch => {
            anyhow::bail!("not a skill command");
        },
    }

    Ok(())
}

/// `repo/tool` exports to `tool.tar.gz`.
fn default_archive_name(id: &str) -> PathBuf {
    let name = id.rsplit('/').next().unwrap_or(id);
    PathBuf::from(format!("{name}.tar.gz"))
}
