//! Git adapter: the only component that shells out.
//!
//! Every operation is a `git` subprocess run with the repository as
//! working directory. Stdout and stderr are captured; failures surface
//! the captured stderr in the error.

use crate::error::{CtxError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Handle to a git repository on disk.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

/// Basic metadata for a single commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub sha: String,
    /// First parent for merge commits; `None` for root commits.
    pub parent_sha: Option<String>,
    /// `Name <email>` form.
    pub author: String,
    /// ISO-8601 author time, as emitted by `%aI`.
    pub timestamp: String,
    /// Subject line.
    pub message: String,
}

/// Files affected between two commits. Renames appear as delete + add;
/// copies as add.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub base_sha: String,
    pub head_sha: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    /// All affected files: modified, added, then deleted.
    pub fn all_files(&self) -> Vec<String> {
        let mut all =
            Vec::with_capacity(self.modified.len() + self.added.len() + self.deleted.len());
        all.extend(self.modified.iter().cloned());
        all.extend(self.added.iter().cloned());
        all.extend(self.deleted.iter().cloned());
        all
    }

    /// Returns true if no files were affected.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

impl GitRepo {
    /// Creates a handle for a repository rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the repository root path this handle operates on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discovers the repository root containing `dir` via
    /// `git rev-parse --show-toplevel`.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self> {
        let output = run_in(dir.as_ref(), &["rev-parse", "--show-toplevel"])?;
        Ok(Self::new(output.trim()))
    }

    /// Returns the full SHA of HEAD.
    pub fn head_sha(&self) -> Result<String> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// Retrieves metadata for a commit.
    pub fn commit_info(&self, sha: &str) -> Result<CommitInfo> {
        // One field per line: SHA, parents, author, author time, subject.
        let output = self.run(&["log", "-1", "--format=%H%n%P%n%an <%ae>%n%aI%n%s", sha])?;
        let mut lines = output.splitn(5, '\n');

        let sha_line = lines.next().unwrap_or("").trim().to_string();
        let parents = lines.next().unwrap_or("").trim();
        let author = lines.next().unwrap_or("").trim().to_string();
        let timestamp = lines.next().unwrap_or("").trim().to_string();
        let message = lines.next().unwrap_or("").trim().to_string();

        if sha_line.is_empty() || timestamp.is_empty() {
            return Err(CtxError::Git {
                command: format!("log -1 {}", sha),
                stderr: "unexpected git log output".to_string(),
            });
        }

        // A merge commit lists several parents; take the first.
        let parent_sha = parents
            .split_whitespace()
            .next()
            .map(|p| p.to_string())
            .filter(|p| !p.is_empty());

        Ok(CommitInfo {
            sha: sha_line,
            parent_sha,
            author,
            timestamp,
            message,
        })
    }

    /// Lists all tracked files at a commit.
    pub fn list_files(&self, sha: &str) -> Result<Vec<String>> {
        let output = self.run(&["ls-tree", "-r", "--name-only", sha])?;
        Ok(output
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect())
    }

    /// Reads a file's content at a commit.
    pub fn file_at_commit(&self, sha: &str, path: &str) -> Result<Vec<u8>> {
        self.run_bytes(&["show", &format!("{}:{}", sha, path)])
    }

    /// Returns the git blob object id for a path at a commit.
    pub fn blob_oid(&self, sha: &str, path: &str) -> Result<String> {
        let output = self.run(&["rev-parse", &format!("{}:{}", sha, path)])?;
        Ok(output.trim().to_string())
    }

    /// Detects file changes between two commits via `diff-tree`.
    pub fn detect_changes(&self, base_sha: &str, head_sha: &str) -> Result<ChangeSet> {
        let output = self.run(&[
            "diff-tree",
            "-r",
            "--no-commit-id",
            "--name-status",
            base_sha,
            head_sha,
        ])?;

        let mut changes = ChangeSet {
            base_sha: base_sha.to_string(),
            head_sha: head_sha.to_string(),
            ..Default::default()
        };

        for line in output.lines() {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let (Some(status), Some(path)) = (parts.next(), parts.next()) else {
                continue;
            };

            match status.chars().next() {
                Some('A') => changes.added.push(path.to_string()),
                Some('D') => changes.deleted.push(path.to_string()),
                Some('M') | Some('T') => changes.modified.push(path.to_string()),
                Some('R') => {
                    // Rename: "old\tnew" is a delete of old plus an add of new.
                    let mut rename = path.splitn(2, '\t');
                    if let (Some(old), Some(new)) = (rename.next(), rename.next()) {
                        changes.deleted.push(old.to_string());
                        changes.added.push(new.to_string());
                    }
                }
                Some('C') => {
                    // Copy: "src\tdest"; only the destination is new.
                    let mut copy = path.splitn(2, '\t');
                    if let (Some(_), Some(dest)) = (copy.next(), copy.next()) {
                        changes.added.push(dest.to_string());
                    }
                }
                _ => {}
            }
        }

        Ok(changes)
    }

    /// Lists commits from `base` (exclusive) to `head` (inclusive) in
    /// chronological order.
    pub fn list_range(&self, base_sha: &str, head_sha: &str) -> Result<Vec<String>> {
        let range = format!("{}..{}", base_sha, head_sha);
        let output = self.run(&["rev-list", "--reverse", &range])?;
        Ok(output
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        run_in(&self.root, args)
    }

    fn run_bytes(&self, args: &[&str]) -> Result<Vec<u8>> {
        run_bytes_in(&self.root, args)
    }
}

fn run_in(dir: &Path, args: &[&str]) -> Result<String> {
    let bytes = run_bytes_in(dir, args)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn run_bytes_in(dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new("git").args(args).current_dir(dir).output()?;

    if !output.status.success() {
        return Err(CtxError::Git {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Creates a git repo with identity configured, returning its handle.
    fn init_repo(dir: &Path) -> GitRepo {
        let repo = GitRepo::new(dir);
        repo.run(&["init", "-q"]).unwrap();
        repo.run(&["config", "user.email", "test@example.com"]).unwrap();
        repo.run(&["config", "user.name", "Test"]).unwrap();
        repo
    }

    fn commit_all(repo: &GitRepo, message: &str) -> String {
        repo.run(&["add", "-A"]).unwrap();
        repo.run(&["commit", "-q", "-m", message]).unwrap();
        repo.head_sha().unwrap()
    }

    #[test]
    fn test_head_and_commit_info() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        fs::write(tmp.path().join("a.txt"), "one").unwrap();
        let sha = commit_all(&repo, "first commit");

        let info = repo.commit_info(&sha).unwrap();
        assert_eq!(info.sha, sha);
        assert_eq!(info.parent_sha, None);
        assert_eq!(info.message, "first commit");
        assert!(info.author.contains("test@example.com"));
        assert!(!info.timestamp.is_empty());
    }

    #[test]
    fn test_parent_sha() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        fs::write(tmp.path().join("a.txt"), "one").unwrap();
        let first = commit_all(&repo, "first");
        fs::write(tmp.path().join("a.txt"), "two").unwrap();
        let second = commit_all(&repo, "second");

        let info = repo.commit_info(&second).unwrap();
        assert_eq!(info.parent_sha, Some(first));
    }

    #[test]
    fn test_list_files_and_content() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/main.go"), "package main\n").unwrap();
        fs::write(tmp.path().join("README.md"), "# readme\n").unwrap();
        let sha = commit_all(&repo, "add files");

        let mut files = repo.list_files(&sha).unwrap();
        files.sort();
        assert_eq!(files, vec!["README.md", "src/main.go"]);

        let content = repo.file_at_commit(&sha, "src/main.go").unwrap();
        assert_eq!(content, b"package main\n");
    }

    #[test]
    fn test_blob_oid_nonempty() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        fs::write(tmp.path().join("a.txt"), "content").unwrap();
        let sha = commit_all(&repo, "c");

        let oid = repo.blob_oid(&sha, "a.txt").unwrap();
        assert_eq!(oid.len(), 40);
    }

    #[test]
    fn test_detect_changes() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        fs::write(tmp.path().join("keep.txt"), "keep").unwrap();
        fs::write(tmp.path().join("change.txt"), "v1").unwrap();
        fs::write(tmp.path().join("remove.txt"), "gone").unwrap();
        let base = commit_all(&repo, "base");

        fs::write(tmp.path().join("change.txt"), "v2").unwrap();
        fs::write(tmp.path().join("new.txt"), "new").unwrap();
        fs::remove_file(tmp.path().join("remove.txt")).unwrap();
        let head = commit_all(&repo, "head");

        let changes = repo.detect_changes(&base, &head).unwrap();
        assert_eq!(changes.added, vec!["new.txt"]);
        assert_eq!(changes.modified, vec!["change.txt"]);
        assert_eq!(changes.deleted, vec!["remove.txt"]);
        assert!(!changes.is_empty());
        assert_eq!(changes.all_files().len(), 3);
    }

    #[test]
    fn test_list_range_chronological() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        fs::write(tmp.path().join("a.txt"), "1").unwrap();
        let c1 = commit_all(&repo, "c1");
        fs::write(tmp.path().join("a.txt"), "2").unwrap();
        let c2 = commit_all(&repo, "c2");
        fs::write(tmp.path().join("a.txt"), "3").unwrap();
        let c3 = commit_all(&repo, "c3");

        let range = repo.list_range(&c1, &c3).unwrap();
        assert_eq!(range, vec![c2, c3]);
    }

    #[test]
    fn test_failure_embeds_stderr() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        let err = repo.commit_info("deadbeef").unwrap_err();
        match err {
            CtxError::Git { stderr, .. } => assert!(!stderr.is_empty()),
            other => panic!("expected Git error, got {:?}", other),
        }
    }

    #[test]
    fn test_discover_repo_root() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        fs::create_dir_all(tmp.path().join("deep/nested")).unwrap();
        fs::write(tmp.path().join("a.txt"), "x").unwrap();
        commit_all(&repo, "c");

        let discovered = GitRepo::discover(tmp.path().join("deep/nested")).unwrap();
        assert_eq!(
            discovered.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }
}
