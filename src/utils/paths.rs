use std::path::{Component, Path, PathBuf};

/// Path of `to` as seen from directory `from`. Both are expected to be absolute.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component);
    }
    relative
}

/// Forward-slash rendering used for metafile keys and source map paths.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
        .replacen("//", "/", 1)
}

/// `dir/rel` of `path` under `base` with its extension swapped, used for mirrored outputs.
pub fn mirror_path(path: &Path, base: &Path, dir: &Path, extension: &str) -> PathBuf {
    let relative = path
        .strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default());
    dir.join(relative).with_extension(extension)
}
