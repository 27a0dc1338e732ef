//! Git branch resolution for incoming events that name a project but no
//! branch. Hard 2 s wall-clock budget per lookup and a short-lived
//! cache keep the cost bounded.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::process::Command;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
const CACHE_TTL: Duration = Duration::from_secs(60);

pub struct BranchResolver {
    projects_root: PathBuf,
    cache: Mutex<HashMap<String, (Instant, Option<String>)>>,
}

impl BranchResolver {
    pub fn new(projects_root: PathBuf) -> Self {
        Self {
            projects_root,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Current branch of the named project, or None when the project is
    /// not a checkout, detached, or the lookup exceeds its budget.
    pub async fn resolve(&self, project: &str) -> Option<String> {
        // Path traversal via crafted project names stays inside the root
        if project.contains('/') || project.contains("..") {
            return None;
        }

        if let Some((at, cached)) = self.cache.lock().expect("branch cache poisoned").get(project)
            && at.elapsed() < CACHE_TTL
        {
            return cached.clone();
        }

        let branch = self.lookup(project).await;
        self.cache
            .lock()
            .expect("branch cache poisoned")
            .insert(project.to_string(), (Instant::now(), branch.clone()));
        branch
    }

    async fn lookup(&self, project: &str) -> Option<String> {
        let dir = self.projects_root.join(project);
        if !dir.is_dir() {
            return None;
        }

        let output = tokio::time::timeout(
            LOOKUP_TIMEOUT,
            Command::new("git")
                .args(["rev-parse", "--abbrev-ref", "HEAD"])
                .current_dir(&dir)
                .output(),
        )
        .await
        .ok()?
        .ok()?;

        if !output.status.success() {
            return None;
        }
        let branch = String::from_utf8(output.stdout).ok()?.trim().to_string();
        if branch.is_empty() || branch == "HEAD" {
            None
        } else {
            Some(branch)
        }
    }
}
