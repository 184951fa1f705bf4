//! [`Repository`] over the `git` binary.
//!
//! Commands run with `std::process::Command`; arguments are passed as an
//! argv vector, never through a shell. Commit identity comes from the
//! configured author via `-c user.name=… -c user.email=…` so the adapter
//! never touches the repository's own config.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use boardsync_core::config::{Author, RepoConfig};

use crate::error::RepoError;
use crate::{ChangeSet, Repository};

pub struct GitRepository {
    root: PathBuf,
    branch: String,
    author: Author,
}

#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitRepository {
    /// Open the clone at `config.clone_path`, cloning `config.url` first if
    /// the directory is not a repository yet.
    pub fn open(config: &RepoConfig) -> Result<Self, RepoError> {
        let repo = GitRepository {
            root: config.clone_path.clone(),
            branch: config.branch.clone(),
            author: config.commits_author.clone(),
        };

        if !repo.root.join(".git").exists() {
            info!("cloning {} into {}", config.url, repo.root.display());
            if let Some(parent) = repo.root.parent() {
                std::fs::create_dir_all(parent)?;
            }
            run_in(
                Path::new("."),
                &[
                    "clone",
                    "--branch",
                    &config.branch,
                    &config.url,
                    &repo.root.to_string_lossy(),
                ],
            )?
            .ok()?;
        }

        Ok(repo)
    }

    /// Adapter over an existing working tree, used by tests.
    pub fn at(root: &Path, branch: &str, author: Author) -> Self {
        GitRepository {
            root: root.to_path_buf(),
            branch: branch.to_string(),
            author,
        }
    }

    fn run(&self, args: &[&str]) -> Result<GitOutput, RepoError> {
        run_in(&self.root, args)
    }
}

fn run_in(dir: &Path, args: &[&str]) -> Result<GitOutput, RepoError> {
    debug!("git {}", args.join(" "));
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RepoError::GitNotFound
            } else {
                RepoError::Io(e)
            }
        })?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

impl GitOutput {
    fn ok(self) -> Result<String, RepoError> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(RepoError::CommandFailed {
                message: self.stderr,
            })
        }
    }
}

impl Repository for GitRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn sync(&self) -> Result<(), RepoError> {
        self.run(&["fetch", "origin"])?.ok()?;
        self.run(&["checkout", &self.branch])?.ok()?;
        self.run(&["pull", "--ff-only", "origin", &self.branch])?
            .ok()?;
        Ok(())
    }

    fn head_rev(&self) -> Result<String, RepoError> {
        self.run(&["rev-parse", "HEAD"])?.ok()
    }

    fn changed_between(&self, from: &str, to: &str) -> Result<ChangeSet, RepoError> {
        let stdout = self
            .run(&["diff", "--name-status", "--no-renames", from, to])?
            .ok()?;
        Ok(parse_name_status(&stdout))
    }

    fn read_at_rev(&self, rev: &str, path: &str) -> Result<String, RepoError> {
        self.run(&["show", &format!("{rev}:{path}")])?.ok()
    }

    fn stage(&self, paths: &[String]) -> Result<(), RepoError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run(&args)?.ok()?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), RepoError> {
        self.run(&["rm", "-f", "--ignore-unmatch", "--", path])?
            .ok()?;
        Ok(())
    }

    fn is_clean(&self) -> Result<bool, RepoError> {
        let stdout = self.run(&["status", "--porcelain"])?.ok()?;
        Ok(stdout.is_empty())
    }

    fn commit(&self, message: &str) -> Result<String, RepoError> {
        let staged = self.run(&["diff", "--cached", "--name-only"])?.ok()?;
        if staged.is_empty() {
            return Err(RepoError::NothingToCommit);
        }
        let name = format!("user.name={}", self.author.name);
        let email = format!("user.email={}", self.author.email);
        self.run(&["-c", &name, "-c", &email, "commit", "-m", message])?
            .ok()?;
        self.head_rev()
    }

    fn push(&self) -> Result<(), RepoError> {
        self.run(&["push", "origin", &self.branch])?.ok()?;
        Ok(())
    }
}

/// Parse `git diff --name-status --no-renames` output. Type changes count
/// as modifications.
fn parse_name_status(stdout: &str) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for line in stdout.lines() {
        let mut parts = line.splitn(2, '\t');
        let (Some(status), Some(path)) = (parts.next(), parts.next()) else {
            continue;
        };
        let path = path.to_string();
        match status.chars().next() {
            Some('A') => changes.added.push(path),
            Some('D') => changes.removed.push(path),
            Some(_) => changes.modified.push(path),
            None => {}
        }
    }
    changes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::{tempdir, TempDir};

    use super::*;

    fn test_author() -> Author {
        Author {
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
        }
    }

    fn init_test_repo() -> (TempDir, GitRepository) {
        let tmp = tempdir().unwrap();
        Command::new("git")
            .args(["init", "-b", "main"])
            .current_dir(tmp.path())
            .output()
            .unwrap();
        let repo = GitRepository::at(tmp.path(), "main", test_author());
        (tmp, repo)
    }

    fn write_and_commit(repo: &GitRepository, name: &str, content: &str) -> String {
        std::fs::write(repo.root().join(name), content).unwrap();
        repo.stage(&[name.to_string()]).unwrap();
        repo.commit(&format!("add {name}")).unwrap()
    }

    #[test]
    fn commit_returns_head_rev() {
        let (_tmp, repo) = init_test_repo();
        let rev = write_and_commit(&repo, "a.json", "{}\n");
        assert_eq!(rev, repo.head_rev().unwrap());
        assert!(repo.is_clean().unwrap());
    }

    #[test]
    fn commit_without_staged_changes_fails() {
        let (_tmp, repo) = init_test_repo();
        write_and_commit(&repo, "a.json", "{}\n");
        let err = repo.commit("empty").unwrap_err();
        assert!(matches!(err, RepoError::NothingToCommit));
    }

    #[test]
    fn changed_between_classifies_statuses() {
        let (_tmp, repo) = init_test_repo();
        let base = write_and_commit(&repo, "keep.json", "{}\n");

        std::fs::write(repo.root().join("keep.json"), "{\"a\":1}\n").unwrap();
        std::fs::write(repo.root().join("new.json"), "{}\n").unwrap();
        repo.stage(&["keep.json".to_string(), "new.json".to_string()])
            .unwrap();
        let head = repo.commit("edit and add").unwrap();

        let changes = repo.changed_between(&base, &head).unwrap();
        assert_eq!(changes.added, vec!["new.json"]);
        assert_eq!(changes.modified, vec!["keep.json"]);
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn removed_files_are_readable_at_previous_rev() {
        let (_tmp, repo) = init_test_repo();
        let base = write_and_commit(&repo, "gone.json", "{\"uid\":\"d1\"}\n");

        repo.remove("gone.json").unwrap();
        let head = repo.commit("remove gone").unwrap();

        let changes = repo.changed_between(&base, &head).unwrap();
        assert_eq!(changes.removed, vec!["gone.json"]);
        let content = repo.read_at_rev(&base, "gone.json").unwrap();
        assert!(content.contains("\"uid\""));
    }

    #[test]
    fn remove_is_idempotent_for_missing_files() {
        let (_tmp, repo) = init_test_repo();
        write_and_commit(&repo, "a.json", "{}\n");
        repo.remove("never-existed.json").unwrap();
    }

    #[test]
    fn filenames_with_colons_round_trip() {
        let (_tmp, repo) = init_test_repo();
        std::fs::create_dir_all(repo.root().join("dashboards")).unwrap();
        let rel = "dashboards/d1:Latency.json";
        std::fs::write(repo.root().join(rel), "{\"title\":\"Latency\"}\n").unwrap();
        repo.stage(&[rel.to_string()]).unwrap();
        let rev = repo.commit("add dashboard file").unwrap();

        let content = repo.read_at_rev(&rev, rel).unwrap();
        assert!(content.contains("Latency"));
    }

    #[test]
    fn parse_name_status_splits_on_first_tab() {
        let changes =
            parse_name_status("A\tdashboards/d1:CPU_Usage.json\nM\tdefs.json\nD\tfolders/f1:Infra.json");
        assert_eq!(changes.added, vec!["dashboards/d1:CPU_Usage.json"]);
        assert_eq!(changes.modified, vec!["defs.json"]);
        assert_eq!(changes.removed, vec!["folders/f1:Infra.json"]);
    }

    #[test]
    fn is_clean_reflects_working_tree() {
        let (_tmp, repo) = init_test_repo();
        write_and_commit(&repo, "a.json", "{}\n");
        assert!(repo.is_clean().unwrap());
        std::fs::write(repo.root().join("b.json"), "{}\n").unwrap();
        assert!(!repo.is_clean().unwrap());
    }
}
