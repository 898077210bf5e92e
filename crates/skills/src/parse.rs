use crate::{
    error::{Error, Result},
    types::{SkillContent, SkillMetadata},
};

/// Fixed manifest filename inside every skill directory.
pub const MANIFEST_FILE: &str = "SKILL.md";

const MAX_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 1024;
const MAX_COMPATIBILITY_LEN: usize = 500;

/// Validate a skill name: lowercase ASCII alphanumerics and single internal
/// hyphens, 1-64 chars.
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
}

/// Check field constraints on already-decoded metadata.
pub fn validate_metadata(meta: &SkillMetadata) -> Result<()> {
    if meta.name.is_empty() {
        return Err(Error::invalid_manifest("frontmatter 'name' field is required"));
    }
    if !validate_name(&meta.name) {
        return Err(Error::invalid_manifest(format!(
            "invalid skill name '{}': must be 1-64 lowercase alphanumeric/hyphen chars",
            meta.name
        )));
    }
    let description_len = meta.description.chars().count();
    if description_len == 0 {
        return Err(Error::invalid_manifest(
            "frontmatter 'description' field is required",
        ));
    }
    if description_len > MAX_DESCRIPTION_LEN {
        return Err(Error::invalid_manifest(format!(
            "description must be 1-{MAX_DESCRIPTION_LEN} characters, got {description_len}"
        )));
    }
    if let Some(compat) = &meta.compatibility {
        let len = compat.chars().count();
        if len > MAX_COMPATIBILITY_LEN {
            return Err(Error::invalid_manifest(format!(
                "compatibility must be max {MAX_COMPATIBILITY_LEN} characters, got {len}"
            )));
        }
    }
    Ok(())
}

/// Parse a SKILL.md file into metadata only (frontmatter).
pub fn parse_metadata(content: &str) -> Result<SkillMetadata> {
    let (frontmatter, _body) = split_frontmatter(content)?;
    decode_frontmatter(frontmatter)
}

/// Parse a SKILL.md file into full content (metadata + body).
pub fn parse_skill(content: &str) -> Result<SkillContent> {
    let (frontmatter, body) = split_frontmatter(content)?;
    let metadata = decode_frontmatter(frontmatter)?;
    Ok(SkillContent {
        metadata,
        body: body.to_string(),
    })
}

/// Render metadata + body back into SKILL.md text.
pub fn render_manifest(meta: &SkillMetadata, body: &str) -> Result<String> {
    validate_metadata(meta)?;
    let yaml = serde_yaml::to_string(meta)
        .map_err(|e| Error::invalid_manifest(format!("failed to encode frontmatter: {e}")))?;
    let yaml = yaml.strip_prefix("---\n").unwrap_or(&yaml);
    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str("---\n");
    out.push_str(yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n\n");
    out.push_str(body.trim());
    if !body.trim().is_empty() {
        out.push('\n');
    }
    Ok(out)
}

fn decode_frontmatter(frontmatter: &str) -> Result<SkillMetadata> {
    let meta: SkillMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::invalid_manifest(format!("failed to parse frontmatter: {e}")))?;
    validate_metadata(&meta)?;
    Ok(meta)
}

/// Split SKILL.md content at `---` delimiters into (frontmatter, body).
fn split_frontmatter(content: &str) -> Result<(&str, &str)> {
    let trimmed = content.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return Err(Error::invalid_manifest(
            "SKILL.md must start with YAML frontmatter delimited by ---",
        ));
    };

    let close_pos = after_open
        .find("\n---")
        .ok_or_else(|| Error::invalid_manifest("SKILL.md missing closing --- for frontmatter"))?;

    let frontmatter = after_open[..close_pos].trim();
    let body = after_open[close_pos + 4..].trim();
    Ok((frontmatter, body))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::error::ErrorKind, std::collections::BTreeMap};

    #[test]
    fn test_validate_name() {
        assert!(validate_name("my-skill"));
        assert!(validate_name("a"));
        assert!(validate_name("skill123"));
        assert!(!validate_name(""));
        assert!(!validate_name("-bad"));
        assert!(!validate_name("bad-"));
        assert!(!validate_name("Bad"));
        assert!(!validate_name("has space"));
        assert!(!validate_name("has--double"));
        assert!(!validate_name("under_score"));
        assert!(!validate_name("plugin:skill"));
        assert!(validate_name(&"a".repeat(64)));
        assert!(!validate_name(&"a".repeat(65)));
    }

    #[test]
    fn test_parse_metadata() {
        let content = r#"---
name: my-skill
description: A test skill
license: MIT
allowed-tools: Bash Read
metadata:
  author: someone
---

# My Skill

Instructions here.
"#;
        let meta = parse_metadata(content).unwrap();
        assert_eq!(meta.name, "my-skill");
        assert_eq!(meta.description, "A test skill");
        assert_eq!(meta.license.as_deref(), Some("MIT"));
        assert_eq!(meta.allowed_tools_list(), vec!["Bash", "Read"]);
        assert_eq!(meta.metadata.unwrap()["author"], "someone");
    }

    #[test]
    fn test_parse_skill_full() {
        let content = r#"---
name: commit
description: Create git commits
---

When asked to commit, run `git add` then `git commit`.
"#;
        let skill = parse_skill(content).unwrap();
        assert_eq!(skill.metadata.name, "commit");
        assert!(skill.body.starts_with("When asked"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = parse_metadata("---\nname: Bad-Name\ndescription: x\n---\nbody\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn test_missing_frontmatter() {
        assert!(parse_metadata("# No frontmatter\nJust markdown.").is_err());
    }

    #[test]
    fn test_missing_closing_delimiter() {
        assert!(parse_metadata("---\nname: test\nno closing\n").is_err());
    }

    #[test]
    fn test_description_required_and_bounded() {
        assert!(parse_metadata("---\nname: a\n---\n").is_err());
        let long = format!("---\nname: a\ndescription: {}\n---\n", "x".repeat(1025));
        assert!(parse_metadata(&long).is_err());
        let max = format!("---\nname: a\ndescription: {}\n---\n", "x".repeat(1024));
        assert!(parse_metadata(&max).is_ok());
    }

    #[test]
    fn test_compatibility_bounded() {
        let long = format!(
            "---\nname: a\ndescription: d\ncompatibility: {}\n---\n",
            "c".repeat(501)
        );
        assert!(parse_metadata(&long).is_err());
        let ok = "---\nname: a\ndescription: d\ncompatibility: Requires docker\n---\n";
        assert_eq!(
            parse_metadata(ok).unwrap().compatibility.as_deref(),
            Some("Requires docker")
        );
    }

    #[test]
    fn test_render_then_parse_preserves_fields() {
        let mut map = BTreeMap::new();
        map.insert("owner".to_string(), "team: tools".to_string());
        let meta = SkillMetadata {
            name: "demo".into(),
            description: "Does: things, with punctuation".into(),
            license: Some("Apache-2.0".into()),
            compatibility: None,
            metadata: Some(map),
            allowed_tools: Some("Read Write".into()),
        };
        let text = render_manifest(&meta, "# Demo\n\nBody text.\n").unwrap();
        assert!(text.starts_with("---\n"));
        let parsed = parse_skill(&text).unwrap();
        assert_eq!(parsed.metadata, meta);
        assert_eq!(parsed.body, "# Demo\n\nBody text.");
    }

    #[test]
    fn test_render_rejects_invalid_metadata() {
        let meta = SkillMetadata {
            name: "Nope".into(),
            description: "d".into(),
            license: None,
            compatibility: None,
            metadata: None,
            allowed_tools: None,
        };
        assert!(render_manifest(&meta, "").is_err());
    }
}
