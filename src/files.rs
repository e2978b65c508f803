use std::borrow::Cow;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::diff;
use crate::encoding::EncodingStrategy;

const BINARY_CHECK_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub len: u64,
    pub is_probably_binary: bool,
}

/// A target file's content with line endings folded to `\n`.
#[derive(Debug, Clone)]
pub struct LoadedText {
    pub text: String,
    pub line_ending: LineEndingStyle,
    pub had_bom: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SaveOptions<'a> {
    pub no_backup: bool,
    pub undo_dir: Option<&'a Path>,
}

pub fn resolve_target(root: &Path, relative: &Path) -> Result<FileEntry> {
    let path = if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        root.join(relative)
    };
    let metadata = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            bail!(
                "target {} does not exist under root {}",
                relative.display(),
                root.display()
            );
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("unable to read metadata for {}", path.display()));
        }
    };
    if !metadata.is_file() {
        bail!("target {} is not a regular file", path.display());
    }
    Ok(FileEntry {
        metadata: FileMetadata {
            len: metadata.len(),
            is_probably_binary: detect_binary(&path)?,
        },
        path,
    })
}

pub fn load(entry: &FileEntry, encoding: &EncodingStrategy) -> Result<LoadedText> {
    if entry.metadata.is_probably_binary {
        bail!("refusing to patch {} (suspected binary file)", entry.path.display());
    }
    let bytes = fs::read(&entry.path)
        .with_context(|| format!("failed to read {}", entry.path.display()))?;
    let decoded = encoding.decode(&bytes);
    if decoded.had_errors {
        bail!(
            "{} is not valid {}; pass --encoding to read it",
            entry.path.display(),
            encoding.name()
        );
    }
    let line_ending = detect_line_ending_style(&decoded.text);
    let text = normalize_to_lf(&decoded.text).into_owned();
    Ok(LoadedText {
        text,
        line_ending,
        had_bom: decoded.had_bom,
    })
}

/// Writes `new_text` over the target, restoring the original line endings
/// and BOM. Returns the backup path when one was made.
pub fn save(
    entry: &FileEntry,
    loaded: &LoadedText,
    new_text: &str,
    encoding: &EncodingStrategy,
    options: &SaveOptions<'_>,
) -> Result<Option<PathBuf>> {
    if let Some(dir) = options.undo_dir {
        write_undo_patch(dir, &entry.path, &loaded.text, new_text)?;
    }
    let restored = restore_from_lf(new_text.to_string(), loaded.line_ending);
    let (encoded, had_errors) = encoding.encode(&restored, loaded.had_bom);
    if had_errors {
        println!(
            "warning: encoding fallback occurred when writing {}; output may be lossy",
            entry.path.display()
        );
    }
    let backup = create_backup_if_needed(&entry.path, options.no_backup)?;
    write_via_temp(&entry.path, &encoded)
        .with_context(|| format!("writing {}", entry.path.display()))?;
    Ok(backup)
}

fn detect_binary(path: &Path) -> Result<bool> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("opening '{}' for binary detection", path.display()))?;
    let mut buf = [0u8; BINARY_CHECK_BYTES];
    let read = file.read(&mut buf)?;
    Ok(buf[..read].contains(&0))
}

fn create_backup_if_needed(path: &Path, no_backup: bool) -> Result<Option<PathBuf>> {
    if no_backup || !path.exists() {
        return Ok(None);
    }

    let mut attempt = 0usize;
    loop {
        let candidate = backup_candidate(path, attempt);
        if !candidate.exists() {
            fs::copy(path, &candidate)
                .with_context(|| format!("creating backup {}", candidate.display()))?;
            return Ok(Some(candidate));
        }
        attempt += 1;
    }
}

fn backup_candidate(path: &Path, index: usize) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("chairpatch_target");
    let suffix = if index == 0 {
        ".bak".to_string()
    } else {
        format!(".bak{index}")
    };
    path.with_file_name(format!("{name}{suffix}"))
}

fn write_via_temp(path: &Path, data: &[u8]) -> Result<()> {
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let unique = format!(
        ".chairpatch-tmp-{}-{}",
        std::process::id(),
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    );
    let temp_path = base_dir.join(unique);
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("creating temp file {}", temp_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing temp file {}", temp_path.display()))?;
    }
    fs::rename(&temp_path, path).or_else(|err| {
        let _ = fs::remove_file(&temp_path);
        Err(err).with_context(|| format!("replacing {}", path.display()))
    })?;
    Ok(())
}

fn write_undo_patch(dir: &Path, path: &Path, old_text: &str, new_text: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating undo dir {}", dir.display()))?;
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());
    let file_name = format!(
        "{}_{}.patch",
        sanitize(&timestamp),
        sanitize(&path.display().to_string())
    );
    let patch_path = dir.join(file_name);
    let patch = diff::unified_diff(path, new_text, old_text, 3);
    fs::write(&patch_path, patch)
        .with_context(|| format!("writing undo patch {}", patch_path.display()))?;
    Ok(())
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => ch,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineEndingStyle {
    Lf,
    Crlf,
    Cr,
}

fn detect_line_ending_style(text: &str) -> LineEndingStyle {
    if text.contains("\r\n") {
        LineEndingStyle::Crlf
    } else if text.contains('\r') {
        LineEndingStyle::Cr
    } else {
        LineEndingStyle::Lf
    }
}

fn normalize_to_lf(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    let mut normalized = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                normalized.push('\n');
            }
            _ => normalized.push(ch),
        }
    }
    Cow::Owned(normalized)
}

fn restore_from_lf(text: String, style: LineEndingStyle) -> String {
    match style {
        LineEndingStyle::Lf => text,
        LineEndingStyle::Crlf => text.replace('\n', "\r\n"),
        LineEndingStyle::Cr => text.replace('\n', "\r"),
    }
}
