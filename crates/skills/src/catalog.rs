//! The catalog: the single entry point front-ends talk to.
//!
//! Every read goes back to the filesystem. The search index is derived state
//! and is rebuilt wholesale after each mutation and each mirror sync.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Weak},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    archive,
    discover::{SkillId, SkillResolver},
    error::{Error, Result, blocking},
    git::GitClient,
    index::{IndexDocument, Indexer},
    mirror::MirrorStore,
    parse::{self, MANIFEST_FILE},
    resources,
    syncer::{
        DEFAULT_SYNC_INTERVAL, MirrorSyncer, SyncReport, SyncStatus, SyncerOptions, UpdateFn,
    },
    types::{MirrorConfig, NewSkill, Resource, ResourceContent, Skill, SkillUpdate},
};

/// Maximum number of index hits considered by [`Catalog::search_skills`].
pub const SEARCH_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Skills root. Created if missing.
    pub root: PathBuf,
    /// Mirror URLs appended to the sidecar list on startup if absent.
    pub seed_urls: Vec<String>,
    pub sync_interval: Duration,
    pub sync_on_start: bool,
}

impl CatalogOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seed_urls: Vec::new(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            sync_on_start: true,
        }
    }
}

pub struct Catalog {
    root: PathBuf,
    resolver: SkillResolver,
    indexer: Arc<dyn Indexer>,
    syncer: Arc<MirrorSyncer>,
}

impl Catalog {
    /// Open the catalog at `options.root` and build the initial index.
    ///
    /// The background sync loop is not started; call [`Self::start_sync`].
    pub async fn new(
        options: CatalogOptions,
        indexer: Arc<dyn Indexer>,
        git: Arc<dyn GitClient>,
    ) -> Result<Arc<Self>> {
        let root = options.root.clone();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::path("failed to create skills root", &root, e))?;

        let store = MirrorStore::in_root(&root);
        let mirrors = blocking(move || store.load()).await?;

        let syncer_options = SyncerOptions {
            root: root.clone(),
            interval: options.sync_interval,
            sync_on_start: options.sync_on_start,
        };

        let catalog = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let on_update: UpdateFn = Arc::new(move || {
                let weak = weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(catalog) => catalog.rebuild_index().await.map(|_| ()),
                        None => Ok(()),
                    }
                })
            });
            Self {
                resolver: SkillResolver::new(root.clone()),
                syncer: MirrorSyncer::new(syncer_options, mirrors, git, Some(on_update)),
                root,
                indexer,
            }
        });

        let seeded = catalog.syncer.seed(&options.seed_urls).await;
        if !seeded.is_empty() {
            info!(count = seeded.len(), "added configured mirrors");
        }
        catalog.rebuild_index().await?;
        Ok(catalog)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Skills ──────────────────────────────────────────────────────────────

    pub async fn list_skills(&self) -> Result<Vec<Skill>> {
        let snapshot = self.syncer.snapshot().await;
        let resolver = self.resolver.clone();
        blocking(move || resolver.list_all(&snapshot)).await
    }

    pub async fn read_skill(&self, id: &str) -> Result<Skill> {
        let snapshot = self.syncer.snapshot().await;
        let resolver = self.resolver.clone();
        let id = id.to_string();
        blocking(move || resolver.read(&id, &snapshot)).await
    }

    /// Ranked search. Hits that no longer resolve are dropped.
    pub async fn search_skills(&self, query: &str) -> Result<Vec<Skill>> {
        let ids = self.indexer.query(query, SEARCH_LIMIT).await?;
        let mut skills = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read_skill(&id).await {
                Ok(skill) => skills.push(skill),
                Err(e) => debug!(%id, error = %e, "dropping stale search hit"),
            }
        }
        Ok(skills)
    }

    /// Re-scan the tree and replace the index contents. Returns the number
    /// of indexed skills.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let skills = self.list_skills().await?;
        let documents: Vec<IndexDocument> = skills.iter().map(IndexDocument::from).collect();
        let count = documents.len();
        self.indexer.replace_all(documents).await?;
        debug!(count, "search index rebuilt");
        Ok(count)
    }

    pub async fn create_skill(&self, new: NewSkill) -> Result<Skill> {
        let (metadata, body) = new.into_parts();
        let text = parse::render_manifest(&metadata, &body)?;
        let name = metadata.name;
        if self.syncer.snapshot().await.is_mirror(&name) {
            return Err(Error::already_exists("mirror directory", name));
        }

        let dir = self.root.join(&name);
        let skill_name = name.clone();
        blocking(move || {
            if std::fs::symlink_metadata(&dir).is_ok() {
                return Err(Error::already_exists("skill", skill_name));
            }
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::path("failed to create skill directory", &dir, e))?;
            let manifest = dir.join(MANIFEST_FILE);
            std::fs::write(&manifest, text)
                .map_err(|e| Error::path("failed to write SKILL.md", &manifest, e))
        })
        .await?;

        info!(%name, "skill created");
        self.rebuild_index().await?;
        self.read_skill(&name).await
    }

    /// Rewrite a local skill's manifest. The name stays fixed to `id`.
    pub async fn update_skill(&self, id: &str, update: SkillUpdate) -> Result<Skill> {
        let dir = self.local_skill_dir(id).await?;
        let (metadata, body) = update.into_parts(id);
        let text = parse::render_manifest(&metadata, &body)?;
        blocking(move || {
            let manifest = dir.join(MANIFEST_FILE);
            std::fs::write(&manifest, text)
                .map_err(|e| Error::path("failed to write SKILL.md", &manifest, e))
        })
        .await?;

        info!(%id, "skill updated");
        self.rebuild_index().await?;
        self.read_skill(id).await
    }

    pub async fn delete_skill(&self, id: &str) -> Result<()> {
        let dir = self.local_skill_dir(id).await?;
        blocking(move || {
            std::fs::remove_dir_all(&dir)
                .map_err(|e| Error::path("failed to delete skill directory", &dir, e))
        })
        .await?;

        info!(%id, "skill deleted");
        self.rebuild_index().await?;
        Ok(())
    }

    /// Resolve `id` for mutation: it must be a local skill.
    async fn local_skill_dir(&self, id: &str) -> Result<PathBuf> {
        let parsed = SkillId::parse(id)?;
        let snapshot = self.syncer.snapshot().await;
        if matches!(parsed, SkillId::Mirrored { .. }) || snapshot.is_mirror(parsed.top_segment()) {
            return Err(Error::ReadOnly { id: id.to_string() });
        }
        let resolver = self.resolver.clone();
        let id = id.to_string();
        blocking(move || resolver.resolve(&id)).await
    }

    // ── Resources ───────────────────────────────────────────────────────────

    pub async fn list_resources(&self, id: &str) -> Result<Vec<Resource>> {
        let skill = self.read_skill(id).await?;
        blocking(move || resources::list(&skill.source_dir)).await
    }

    pub async fn read_resource(&self, id: &str, path: &str) -> Result<ResourceContent> {
        let skill = self.read_skill(id).await?;
        let path = path.to_string();
        blocking(move || resources::read(&skill.source_dir, &path)).await
    }

    pub async fn resource_info(&self, id: &str, path: &str) -> Result<Resource> {
        let skill = self.read_skill(id).await?;
        let path = path.to_string();
        blocking(move || resources::info(&skill.source_dir, &path)).await
    }

    pub async fn write_resource(&self, id: &str, path: &str, content: Vec<u8>) -> Result<Resource> {
        let skill = self.writable_skill(id).await?;
        let path = path.to_string();
        blocking(move || resources::write(&skill.source_dir, &path, &content)).await
    }

    pub async fn delete_resource(&self, id: &str, path: &str) -> Result<()> {
        let skill = self.writable_skill(id).await?;
        let path = path.to_string();
        blocking(move || resources::delete(&skill.source_dir, &path)).await
    }

    async fn writable_skill(&self, id: &str) -> Result<Skill> {
        let skill = self.read_skill(id).await?;
        if skill.read_only {
            return Err(Error::ReadOnly { id: skill.id });
        }
        Ok(skill)
    }

    // ── Archives ────────────────────────────────────────────────────────────

    pub async fn export_skill(&self, id: &str) -> Result<Vec<u8>> {
        let skill = self.read_skill(id).await?;
        blocking(move || archive::export(&skill.source_dir)).await
    }

    /// Import an archive as a new local skill. Returns its identifier.
    pub async fn import_skill(&self, bytes: Vec<u8>) -> Result<String> {
        let root = self.root.clone();
        let name = blocking(move || archive::import(&bytes, &root)).await?;
        self.rebuild_index().await?;
        Ok(name)
    }

    // ── Mirrors ─────────────────────────────────────────────────────────────

    pub async fn list_mirrors(&self) -> Vec<MirrorConfig> {
        self.syncer.list_mirrors().await
    }

    /// Add and sync a mirror. The index is rebuilt by the sync callback.
    pub async fn add_mirror(&self, url: &str) -> Result<MirrorConfig> {
        self.syncer.add_mirror(url).await
    }

    /// Remove a mirror and delete its working directory.
    pub async fn remove_mirror(&self, url: &str) -> Result<MirrorConfig> {
        let removed = self.syncer.remove_mirror(url).await?;
        let dir = self.root.join(&removed.name);
        let target = dir.clone();
        let deleted = blocking(move || {
            if target.exists() {
                std::fs::remove_dir_all(&target)?;
            }
            Ok(())
        })
        .await;
        if let Err(e) = deleted {
            warn!(dir = %dir.display(), error = %e, "failed to delete mirror directory");
        }
        self.rebuild_index().await?;
        Ok(removed)
    }

    pub async fn set_mirror_enabled(&self, url: &str, enabled: bool) -> Result<MirrorConfig> {
        let updated = self.syncer.set_enabled(url, enabled).await?;
        self.rebuild_index().await?;
        Ok(updated)
    }

    pub async fn sync_mirror(&self, url: &str) -> Result<SyncStatus> {
        self.syncer.sync_one(url).await
    }

    pub async fn sync_all(&self) -> Result<SyncReport> {
        self.syncer.sync_all().await
    }

    pub async fn start_sync(&self) -> Result<()> {
        self.syncer.start().await
    }

    pub async fn stop_sync(&self) {
        self.syncer.stop().await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::ErrorKind,
            index::MemoryIndex,
            testing::{Failure, FakeGit, write_skill},
            types::Encoding,
        },
    };

    const REPO: &str = "https://example.com/org/repo.git";
    const BROKEN: &str = "https://example.com/org/broken.git";

    async fn open(root: &Path, git: Arc<FakeGit>) -> Arc<Catalog> {
        Catalog::new(
            CatalogOptions::new(root),
            Arc::new(MemoryIndex::new()),
            git,
        )
        .await
        .unwrap()
    }

    fn ids(skills: &[Skill]) -> Vec<&str> {
        skills.iter().map(|s| s.id.as_str()).collect()
    }

    fn new_skill(name: &str) -> NewSkill {
        NewSkill {
            name: name.into(),
            description: format!("{name} description"),
            body: format!("# {name}\n\nSteps."),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn local_and_mirrored_skills_side_by_side() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(&tmp.path().join("demo"), "demo").unwrap();
        let git = Arc::new(FakeGit::default().with_repo(REPO, &["skills/tool"]));
        let catalog = open(tmp.path(), git).await;

        catalog.add_mirror(REPO).await.unwrap();

        let skills = catalog.list_skills().await.unwrap();
        assert_eq!(ids(&skills), vec!["demo", "repo/tool"]);
        assert!(!skills[0].read_only);
        assert!(skills[1].read_only);

        let tool = catalog.read_skill("repo/tool").await.unwrap();
        assert_eq!(tool.metadata.name, "tool");
        assert!(tool.read_only);

        let hits = catalog.search_skills("tool").await.unwrap();
        assert_eq!(ids(&hits), vec!["repo/tool"]);
    }

    #[tokio::test]
    async fn disabled_mirror_is_hidden_but_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit::default().with_repo(REPO, &["tool"]));
        let catalog = open(tmp.path(), git).await;
        catalog.add_mirror(REPO).await.unwrap();
        let before: Vec<String> = catalog
            .list_skills()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();

        catalog.set_mirror_enabled(REPO, false).await.unwrap();
        assert!(catalog.list_skills().await.unwrap().is_empty());
        assert!(catalog.search_skills("tool").await.unwrap().is_empty());
        let skill = catalog.read_skill("repo/tool").await.unwrap();
        assert!(skill.read_only);
        assert!(tmp.path().join("repo/tool/SKILL.md").is_file());

        catalog.set_mirror_enabled(REPO, true).await.unwrap();
        let after: Vec<String> = catalog
            .list_skills()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn sync_all_indexes_good_mirror_despite_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit::default().with_repo(REPO, &["tool"]));
        git.fail(BROKEN, Failure::Transient);
        let mut options = CatalogOptions::new(tmp.path());
        options.seed_urls = vec![BROKEN.to_string(), REPO.to_string()];
        let catalog = Catalog::new(options, Arc::new(MemoryIndex::new()), git)
            .await
            .unwrap();
        assert_eq!(catalog.list_mirrors().await.len(), 2);

        let report = catalog.sync_all().await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[0].url, BROKEN);
        assert_eq!(
            ids(&catalog.search_skills("tool").await.unwrap()),
            vec!["repo/tool"]
        );
    }

    #[tokio::test]
    async fn seeded_mirrors_are_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = CatalogOptions::new(tmp.path());
        options.seed_urls = vec![REPO.to_string()];
        Catalog::new(
            options.clone(),
            Arc::new(MemoryIndex::new()),
            Arc::new(FakeGit::default()),
        )
        .await
        .unwrap();

        let stored = MirrorStore::in_root(tmp.path()).load().unwrap();
        assert_eq!(stored.len(), 1);

        let reopened = Catalog::new(
            options,
            Arc::new(MemoryIndex::new()),
            Arc::new(FakeGit::default()),
        )
        .await
        .unwrap();
        assert_eq!(reopened.list_mirrors().await.len(), 1);
    }

    #[tokio::test]
    async fn create_update_delete_local_skill() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = open(tmp.path(), Arc::new(FakeGit::default())).await;

        let created = catalog.create_skill(new_skill("notes")).await.unwrap();
        assert_eq!(created.id, "notes");
        assert_eq!(
            catalog.create_skill(new_skill("notes")).await.unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(ids(&catalog.search_skills("notes").await.unwrap()), vec!["notes"]);

        let updated = catalog
            .update_skill("notes", SkillUpdate {
                description: "Meeting minutes".into(),
                license: Some("MIT".into()),
                body: "Write them down.".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.metadata.description, "Meeting minutes");
        assert_eq!(updated.body, "Write them down.");
        assert_eq!(ids(&catalog.search_skills("minutes").await.unwrap()), vec!["notes"]);

        catalog.delete_skill("notes").await.unwrap();
        assert!(!tmp.path().join("notes").exists());
        assert!(catalog.search_skills("notes").await.unwrap().is_empty());
        assert_eq!(
            catalog.read_skill("notes").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn create_rejects_invalid_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = open(tmp.path(), Arc::new(FakeGit::default())).await;
        let err = catalog.create_skill(new_skill("Bad Name")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        let mut empty = new_skill("ok");
        empty.description.clear();
        assert!(catalog.create_skill(empty).await.is_err());
    }

    #[tokio::test]
    async fn mirrored_skills_are_read_only() {
        let tmp = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit::default().with_repo(REPO, &["tool"]));
        let catalog = open(tmp.path(), git).await;
        catalog.add_mirror(REPO).await.unwrap();

        let err = catalog
            .write_resource("repo/tool", "scripts/x.sh", b"echo".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        assert_eq!(
            catalog
                .delete_resource("repo/tool", "scripts/x.sh")
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::ReadOnly
        );
        assert_eq!(
            catalog.delete_skill("repo/tool").await.unwrap_err().kind(),
            ErrorKind::ReadOnly
        );
        assert_eq!(
            catalog
                .update_skill("repo", SkillUpdate {
                    description: "x".into(),
                    ..Default::default()
                })
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::ReadOnly
        );
        assert!(tmp.path().join("repo/tool/SKILL.md").is_file());
    }

    #[tokio::test]
    async fn resources_round_trip_through_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = open(tmp.path(), Arc::new(FakeGit::default())).await;
        catalog.create_skill(new_skill("demo")).await.unwrap();

        catalog
            .write_resource("demo", "references/guide.md", b"# Guide\n".to_vec())
            .await
            .unwrap();
        let listed = catalog.list_resources("demo").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "references/guide.md");

        let content = catalog.read_resource("demo", "references/guide.md").await.unwrap();
        assert_eq!(content.encoding, Encoding::Utf8);
        assert_eq!(content.content, "# Guide\n");

        let err = catalog.read_resource("demo", "../demo/SKILL.md").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RejectedPath);

        catalog.delete_resource("demo", "references/guide.md").await.unwrap();
        assert_eq!(
            catalog
                .resource_info("demo", "references/guide.md")
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn export_import_between_catalogs() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit::default().with_repo(REPO, &["nested/tool"]));
        let source = open(src_dir.path(), git).await;
        let target = open(dst_dir.path(), Arc::new(FakeGit::default())).await;
        source.add_mirror(REPO).await.unwrap();

        let bytes = source.export_skill("repo/tool").await.unwrap();
        let name = target.import_skill(bytes.clone()).await.unwrap();
        assert_eq!(name, "tool");
        assert_eq!(
            std::fs::read(src_dir.path().join("repo/nested/tool/SKILL.md")).unwrap(),
            std::fs::read(dst_dir.path().join("tool/SKILL.md")).unwrap()
        );
        let imported = target.read_skill("tool").await.unwrap();
        assert!(!imported.read_only);
        assert_eq!(ids(&target.search_skills("tool").await.unwrap()), vec!["tool"]);

        assert_eq!(
            target.import_skill(bytes).await.unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
    }

    #[tokio::test]
    async fn remove_mirror_deletes_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit::default().with_repo(REPO, &["tool"]));
        let catalog = open(tmp.path(), git).await;
        catalog.add_mirror(REPO).await.unwrap();

        catalog.remove_mirror(REPO).await.unwrap();
        assert!(!tmp.path().join("repo").exists());
        assert!(catalog.list_mirrors().await.is_empty());
        assert!(catalog.search_skills("tool").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_mirror_never_adopts_local_skill() {
        let tmp = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit::default().with_repo(REPO, &["tool"]));
        let catalog = open(tmp.path(), Arc::clone(&git)).await;
        catalog.create_skill(new_skill("repo")).await.unwrap();

        let err = catalog.add_mirror(REPO).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(git.pull_count(), 0);
        assert!(catalog.list_mirrors().await.is_empty());
        assert_eq!(
            catalog.remove_mirror(REPO).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let skill = catalog.read_skill("repo").await.unwrap();
        assert!(!skill.read_only);
        assert!(tmp.path().join("repo").join(MANIFEST_FILE).is_file());
    }

    #[tokio::test]
    async fn search_drops_hits_removed_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(&tmp.path().join("gone"), "gone").unwrap();
        let catalog = open(tmp.path(), Arc::new(FakeGit::default())).await;

        std::fs::remove_dir_all(tmp.path().join("gone")).unwrap();
        assert!(catalog.search_skills("gone").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_callback_rebuilds_index() {
        let tmp = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit::default().with_repo(REPO, &["tool"]));
        let catalog = open(tmp.path(), Arc::clone(&git)).await;
        catalog.add_mirror(REPO).await.unwrap();

        git.add_skill(REPO, "extra");
        assert_eq!(catalog.sync_mirror(REPO).await.unwrap(), SyncStatus::Updated);
        assert_eq!(
            ids(&catalog.search_skills("extra").await.unwrap()),
            vec!["repo/extra"]
        );
    }

    #[tokio::test]
    async fn catalogs_on_separate_roots_are_independent() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_skill(&a.path().join("alpha"), "alpha").unwrap();
        write_skill(&b.path().join("beta"), "beta").unwrap();
        let first = open(a.path(), Arc::new(FakeGit::default())).await;
        let second = open(b.path(), Arc::new(FakeGit::default())).await;

        assert_eq!(ids(&first.search_skills("alpha").await.unwrap()), vec!["alpha"]);
        assert!(first.search_skills("beta").await.unwrap().is_empty());
        assert_eq!(ids(&second.search_skills("beta").await.unwrap()), vec!["beta"]);
    }
}
