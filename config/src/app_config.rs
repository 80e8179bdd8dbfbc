use directories::ProjectDirs;
use std::{
    env,
    path::PathBuf,
};

lazy_static::lazy_static! {
    pub(crate) static ref PROJECT_NAME: String = "FSIMAGE_EXPORTER".to_string();
    static ref CACHE_FOLDER: Option<PathBuf> = env::var(format!("{}_CACHE", PROJECT_NAME.clone()))
        .ok()
        .map(PathBuf::from);
    static ref CONFIG_FOLDER: Option<PathBuf> = env::var(format!("{}_CONFIG", PROJECT_NAME.clone()))
        .ok()
        .map(PathBuf::from);
}

/// Directory used for transient downloads (the remote staging file lives below it).
pub fn get_cache_dir() -> PathBuf {
    if let Some(s) = CACHE_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.cache_dir().to_path_buf()
    } else {
        env::temp_dir().join("fsimage-exporter")
    }
}

pub fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "apache-hadoop", "fsimage-exporter")
}
