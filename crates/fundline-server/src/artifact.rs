//! Frontend bundle verification.
//!
//! The frontend build writes its output to one configured directory
//! (`FUNDLINE_STATIC_DIR`, default `dist/public`). [`verify_bundle`] checks
//! that directory once, in one place, before the server starts serving it:
//!
//! 1. the directory exists,
//! 2. `index.html` exists and is at least `min_index_bytes` long,
//! 3. `index.html` has a mount point (`id="root"`) or a `<script` tag,
//! 4. `assets/` exists and holds at least one `.js` file.
//!
//! The check only reads the file system, so running it repeatedly against the
//! same build yields the same report.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Result of one bundle check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// All checks run against one bundle directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleReport {
    pub dir: PathBuf,
    pub checks: Vec<Check>,
}

impl BundleReport {
    /// `true` when every check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Checks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Convert a failing report into an error.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Incomplete`] listing every failed check.
    pub fn into_result(self) -> Result<Self, ArtifactError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(ArtifactError::Incomplete {
                dir: self.dir.clone(),
                failures: self
                    .failures()
                    .map(|c| format!("{}: {}", c.name, c.detail))
                    .collect(),
            })
        }
    }
}

impl fmt::Display for BundleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bundle {}", self.dir.display())?;
        for check in &self.checks {
            let mark = if check.passed { "ok  " } else { "FAIL" };
            writeln!(f, "  [{mark}] {:<12} {}", check.name, check.detail)?;
        }
        Ok(())
    }
}

/// The frontend bundle is missing or incomplete.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("frontend bundle at '{}' is incomplete: {}", dir.display(), failures.join("; "))]
    Incomplete { dir: PathBuf, failures: Vec<String> },
}

/// Run every bundle check against `dir`.
#[must_use]
pub fn verify_bundle(dir: &Path, min_index_bytes: u64) -> BundleReport {
    let mut checks = Vec::with_capacity(4);

    if dir.is_dir() {
        checks.push(Check::pass("directory", "present"));
    } else {
        checks.push(Check::fail(
            "directory",
            "missing; build the frontend or set FUNDLINE_STATIC_DIR",
        ));
        return BundleReport {
            dir: dir.to_path_buf(),
            checks,
        };
    }

    let index = dir.join("index.html");
    match fs::metadata(&index) {
        Ok(meta) if meta.len() >= min_index_bytes => {
            checks.push(Check::pass("index.html", format!("{} bytes", meta.len())));
        }
        Ok(meta) => checks.push(Check::fail(
            "index.html",
            format!("{} bytes, expected at least {min_index_bytes}", meta.len()),
        )),
        Err(e) => checks.push(Check::fail("index.html", format!("unreadable: {e}"))),
    }

    match fs::read_to_string(&index) {
        Ok(html) if html.contains("id=\"root\"") || html.contains("<script") => {
            checks.push(Check::pass("entrypoint", "mount point found"));
        }
        Ok(_) => checks.push(Check::fail(
            "entrypoint",
            "index.html has no id=\"root\" mount point or <script> tag",
        )),
        Err(_) => checks.push(Check::fail("entrypoint", "index.html unreadable")),
    }

    checks.push(check_assets(&dir.join("assets")));

    BundleReport {
        dir: dir.to_path_buf(),
        checks,
    }
}

fn check_assets(assets: &Path) -> Check {
    let entries = match fs::read_dir(assets) {
        Ok(entries) => entries,
        Err(e) => return Check::fail("assets", format!("assets/ unreadable: {e}")),
    };

    let scripts = entries
        .filter_map(Result::ok)
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("js"))
        })
        .count();

    if scripts == 0 {
        Check::fail("assets", "no .js files in assets/")
    } else {
        Check::pass("assets", format!("{scripts} script file(s)"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write_bundle(dir: &Path, index_padding: usize) {
        fs::create_dir_all(dir.join("assets")).unwrap();
        let index = format!(
            "<!doctype html><html><head><script type=\"module\" src=\"/assets/index-abc123.js\"></script></head>\
             <body><div id=\"root\"></div>{}</body></html>",
            " ".repeat(index_padding)
        );
        fs::write(dir.join("index.html"), index).unwrap();
        fs::write(dir.join("assets/index-abc123.js"), "console.log('hi')").unwrap();
    }

    #[test]
    fn complete_bundle_passes_twice_with_same_report() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), 512);

        let first = verify_bundle(tmp.path(), 256);
        let second = verify_bundle(tmp.path(), 256);
        assert!(first.passed(), "{first}");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_directory_short_circuits() {
        let tmp = tempfile::tempdir().unwrap();
        let report = verify_bundle(&tmp.path().join("nope"), 256);
        assert!(!report.passed());
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].name, "directory");
    }

    #[test]
    fn tiny_index_fails_size_check() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), 0);
        let report = verify_bundle(tmp.path(), 10_000);
        let failed: Vec<_> = report.failures().map(|c| c.name).collect();
        assert_eq!(failed, vec!["index.html"]);
    }

    #[test]
    fn empty_assets_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), 512);
        fs::remove_file(tmp.path().join("assets/index-abc123.js")).unwrap();
        fs::write(tmp.path().join("assets/logo.svg"), "<svg/>").unwrap();

        let err = verify_bundle(tmp.path(), 256).into_result().unwrap_err();
        assert!(err.to_string().contains("no .js files"));
    }
}
