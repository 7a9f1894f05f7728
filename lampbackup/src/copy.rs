//! Recursive directory copying for the staging tree.
//!
//! Symlinks are followed so that the snapshot contains real file content;
//! TLS layouts such as Let's Encrypt's `live/` directory are made of links
//! into a sibling `archive/` directory. A directory link that resolves to one
//! of its own ancestors is reported as an error instead of recursing forever.

use camino::Utf8Path;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Totals gathered while copying a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Regular files copied.
    pub files: u64,
    /// Directories created below the destination root.
    pub directories: u64,
    /// Bytes written.
    pub bytes: u64,
}

/// Copy the contents of `from` into `to`, recursing into subdirectories.
///
/// `to` is created if it does not exist. Existing destination files are
/// overwritten. Entries that are neither files nor directories (sockets,
/// FIFOs, device nodes) are skipped with a warning.
///
/// # Errors
///
/// Returns the first I/O error encountered, annotated with the offending
/// path. A directory symlink cycle yields an error of kind
/// [`io::ErrorKind::Other`].
pub fn copy_tree(from: &Utf8Path, to: &Utf8Path) -> io::Result<CopyStats> {
    let mut stats = CopyStats::default();
    let mut ancestors = Vec::new();
    copy_dir_contents(from.as_std_path(), to.as_std_path(), &mut ancestors, &mut stats)?;
    Ok(stats)
}

fn copy_dir_contents(
    from: &Path,
    to: &Path,
    ancestors: &mut Vec<PathBuf>,
    stats: &mut CopyStats,
) -> io::Result<()> {
    let canonical = fs::canonicalize(from).map_err(|e| annotate(from, &e))?;
    if ancestors.contains(&canonical) {
        return Err(io::Error::other(format!(
            "symlink cycle detected at {} (resolves to {})",
            from.display(),
            canonical.display()
        )));
    }
    ancestors.push(canonical);

    fs::create_dir_all(to).map_err(|e| annotate(to, &e))?;

    for entry in fs::read_dir(from).map_err(|e| annotate(from, &e))? {
        let entry = entry.map_err(|e| annotate(from, &e))?;
        let source = entry.path();
        let destination = to.join(entry.file_name());

        let metadata = fs::metadata(&source).map_err(|e| annotate(&source, &e))?;
        if metadata.is_dir() {
            copy_dir_contents(&source, &destination, ancestors, stats)?;
            stats.directories += 1;
        } else if metadata.is_file() {
            let written = fs::copy(&source, &destination).map_err(|e| annotate(&source, &e))?;
            stats.files += 1;
            stats.bytes += written;
        } else {
            warn!("skipping special file {}", source.display());
        }
    }

    ancestors.pop();
    debug!("copied {} to {}", from.display(), to.display());
    Ok(())
}

fn annotate(path: &Path, err: &io::Error) -> io::Error {
    io::Error::new(err.kind(), format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Tree {
        _temp: TempDir,
        src: Utf8PathBuf,
        dst: Utf8PathBuf,
    }

    #[fixture]
    fn tree() -> Tree {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_owned()).expect("UTF-8 temp dir");
        let src = root.join("src");
        let dst = root.join("dst");
        fs::create_dir_all(&src).expect("create src");
        fs::create_dir_all(&dst).expect("create dst");
        Tree {
            _temp: temp,
            src,
            dst,
        }
    }

    #[rstest]
    fn copies_nested_tree_with_identical_content(tree: Tree) {
        fs::create_dir_all(tree.src.join("assets/img")).expect("mkdir");
        fs::write(tree.src.join("index.html"), b"<h1>hi</h1>").expect("write");
        fs::write(tree.src.join("assets/img/logo.png"), [0x89, b'P', b'N', b'G']).expect("write");
        fs::create_dir_all(tree.src.join("empty")).expect("mkdir");

        let stats = copy_tree(&tree.src, &tree.dst).expect("copy succeeds");

        assert_eq!(
            fs::read(tree.dst.join("index.html")).expect("read"),
            b"<h1>hi</h1>"
        );
        assert_eq!(
            fs::read(tree.dst.join("assets/img/logo.png")).expect("read"),
            [0x89, b'P', b'N', b'G']
        );
        assert!(tree.dst.join("empty").is_dir());
        assert_eq!(stats.files, 2);
        assert_eq!(stats.directories, 3);
        assert_eq!(stats.bytes, 15);
    }

    #[rstest]
    fn copies_hidden_files(tree: Tree) {
        fs::write(tree.src.join(".htaccess"), b"Deny from all").expect("write");
        copy_tree(&tree.src, &tree.dst).expect("copy succeeds");
        assert!(tree.dst.join(".htaccess").is_file());
    }

    #[rstest]
    fn overwrites_existing_destination_files(tree: Tree) {
        fs::write(tree.src.join("a.txt"), b"new").expect("write");
        fs::write(tree.dst.join("a.txt"), b"old content").expect("write");
        copy_tree(&tree.src, &tree.dst).expect("copy succeeds");
        assert_eq!(fs::read(tree.dst.join("a.txt")).expect("read"), b"new");
    }

    #[rstest]
    fn creates_missing_destination(tree: Tree) {
        fs::write(tree.src.join("a.txt"), b"x").expect("write");
        let nested = tree.dst.join("not/yet/there");
        copy_tree(&tree.src, &nested).expect("copy succeeds");
        assert!(nested.join("a.txt").is_file());
    }

    #[rstest]
    fn missing_source_is_an_error(tree: Tree) {
        let err = copy_tree(&tree.src.join("absent"), &tree.dst).expect_err("must fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("absent"));
    }

    #[cfg(unix)]
    #[rstest]
    fn follows_file_symlinks(tree: Tree) {
        use std::os::unix::fs::symlink;

        fs::create_dir_all(tree.src.join("archive")).expect("mkdir");
        fs::create_dir_all(tree.src.join("live")).expect("mkdir");
        fs::write(tree.src.join("archive/cert1.pem"), b"CERT").expect("write");
        symlink("../archive/cert1.pem", tree.src.join("live/cert.pem")).expect("symlink");

        copy_tree(&tree.src, &tree.dst).expect("copy succeeds");

        let copied = tree.dst.join("live/cert.pem");
        assert!(
            !fs::symlink_metadata(&copied)
                .expect("metadata")
                .file_type()
                .is_symlink()
        );
        assert_eq!(fs::read(copied).expect("read"), b"CERT");
    }

    #[cfg(unix)]
    #[rstest]
    fn directory_symlink_cycle_is_an_error(tree: Tree) {
        use std::os::unix::fs::symlink;

        fs::create_dir_all(tree.src.join("a")).expect("mkdir");
        symlink("..", tree.src.join("a/loop")).expect("symlink");

        let err = copy_tree(&tree.src, &tree.dst).expect_err("cycle must fail");
        assert!(err.to_string().contains("cycle"), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[rstest]
    fn dangling_symlink_is_an_error(tree: Tree) {
        use std::os::unix::fs::symlink;

        symlink("missing-target", tree.src.join("broken")).expect("symlink");
        let err = copy_tree(&tree.src, &tree.dst).expect_err("dangling link must fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[rstest]
    fn sibling_links_to_same_directory_are_not_cycles(tree: Tree) {
        use std::os::unix::fs::symlink;

        fs::create_dir_all(tree.src.join("shared")).expect("mkdir");
        fs::write(tree.src.join("shared/f.txt"), b"f").expect("write");
        symlink("shared", tree.src.join("one")).expect("symlink");
        symlink("shared", tree.src.join("two")).expect("symlink");

        copy_tree(&tree.src, &tree.dst).expect("copy succeeds");
        assert!(tree.dst.join("one/f.txt").is_file());
        assert!(tree.dst.join("two/f.txt").is_file());
    }
}
