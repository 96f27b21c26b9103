use std::path::{Path, PathBuf};

/// Derives a filename path with the extension swapped for `ext`, e.g.
/// `status_ext_path("movie.mp4", "xz3")` → `movie.xz3`. Used both for
/// locating a download's progress log and for probing whether a stale
/// progress log already claims a candidate output name.
pub fn status_ext_path(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext)
}

/// Picks an output filename that does not collide with an existing file or
/// its progress-log sibling. If neither `base` nor `status_ext_path(base,
/// progress_ext)` exists, `base` is returned unchanged. Otherwise `_1`,
/// `_2`, … is appended before the file stem's extension until a free name
/// is found.
pub fn generate_unique_filename(base: &Path, progress_ext: &str) -> PathBuf {
    if !base.exists() && !status_ext_path(base, progress_ext).exists() {
        return base.to_path_buf();
    }

    let parent = base.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = base.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1u64;
    loop {
        let candidate_name = match &extension {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() && !status_ext_path(&candidate, progress_ext).exists() {
            return candidate;
        }
        n += 1;
    }
}
