//! Checkpoint and ONNX Runtime provisioning.
//!
//! Resolves where a named checkpoint lives on disk and downloads whatever
//! is missing from the Hugging Face hub before the classifier is loaded.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;

use crate::classifier::NliConfig;

/// ONNX export of `typeform/distilbert-base-uncased-mnli`.
pub const DEFAULT_CHECKPOINT: &str = "Xenova/distilbert-base-uncased-mnli";

/// Default Hugging Face hub endpoint.
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

/// Files fetched for a checkpoint: (path in the hub repo, local name).
const CHECKPOINT_FILES: &[(&str, &str)] = &[
    ("onnx/model.onnx", "model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
];

/// ONNX Runtime version to download.
const ONNX_RUNTIME_VERSION: &str = "1.23.2";

#[cfg(all(target_os = "windows", target_arch = "x86_64"))]
const ONNX_RUNTIME_URL: &str = "https://github.com/microsoft/onnxruntime/releases/download/v1.23.2/onnxruntime-win-x64-1.23.2.zip";

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
const ONNX_RUNTIME_URL: &str = "https://github.com/microsoft/onnxruntime/releases/download/v1.23.2/onnxruntime-linux-x64-1.23.2.tgz";

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
const ONNX_RUNTIME_URL: &str = "https://github.com/microsoft/onnxruntime/releases/download/v1.23.2/onnxruntime-linux-aarch64-1.23.2.tgz";

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
const ONNX_RUNTIME_URL: &str = "https://github.com/microsoft/onnxruntime/releases/download/v1.23.2/onnxruntime-osx-arm64-1.23.2.tgz";

#[cfg(not(any(
    all(target_os = "windows", target_arch = "x86_64"),
    all(target_os = "linux", target_arch = "x86_64"),
    all(target_os = "linux", target_arch = "aarch64"),
    all(target_os = "macos", target_arch = "aarch64"),
)))]
const ONNX_RUNTIME_URL: &str = "";

#[cfg(target_os = "windows")]
const ONNX_RUNTIME_LIB: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const ONNX_RUNTIME_LIB: &str = "libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const ONNX_RUNTIME_LIB: &str = "libonnxruntime.so";

/// Environment variable `ort` reads to locate the runtime library.
pub const ORT_DYLIB_ENV: &str = "ORT_DYLIB_PATH";

/// Download progress callback type (uses Arc for Clone support).
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Download progress information.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Current step description.
    pub step: String,
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Total bytes to download (if known).
    pub total: Option<u64>,
    /// Whether the step is complete.
    pub complete: bool,
}

impl DownloadProgress {
    /// Creates a new progress update.
    pub fn new(step: impl Into<String>, downloaded: u64, total: Option<u64>) -> Self {
        Self {
            step: step.into(),
            downloaded,
            total,
            complete: false,
        }
    }

    /// Creates a completion progress.
    pub fn complete(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            downloaded: 0,
            total: None,
            complete: true,
        }
    }

    /// Returns progress as a percentage (0-100).
    pub fn percentage(&self) -> Option<u8> {
        self.total.map(|t| {
            if t == 0 {
                100
            } else {
                ((self.downloaded as f64 / t as f64) * 100.0).min(100.0) as u8
            }
        })
    }
}

/// Error types for model downloading.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive extraction error: {0}")]
    Archive(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// On-disk store for the checkpoint and the ONNX Runtime library.
#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
    lib_dir: PathBuf,
    checkpoint: String,
    hub_url: String,
}

impl ModelStore {
    /// Creates a store under the platform data directory.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "searchrel", "Searchrel")?;
        Some(Self::with_data_dir(project_dirs.data_dir()))
    }

    /// Creates a store rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            models_dir: data_dir.join("models"),
            lib_dir: data_dir.join("lib"),
            checkpoint: DEFAULT_CHECKPOINT.to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
        }
    }

    /// Sets the checkpoint name (`owner/repo`).
    pub fn with_checkpoint(mut self, checkpoint: impl Into<String>) -> Self {
        self.checkpoint = checkpoint.into();
        self
    }

    /// Sets the hub base URL.
    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn checkpoint(&self) -> &str {
        &self.checkpoint
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn lib_dir(&self) -> &Path {
        &self.lib_dir
    }

    /// Directory holding the checkpoint files (`owner--repo`).
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.models_dir.join(self.checkpoint.replace('/', "--"))
    }

    /// Classifier configuration for the stored checkpoint.
    pub fn nli_config(&self) -> NliConfig {
        NliConfig::from_dir(self.checkpoint_dir())
    }

    /// Hub URL for a file in the checkpoint repo.
    pub fn file_url(&self, remote: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.hub_url, self.checkpoint, remote)
    }

    /// Checkpoint files not yet on disk, as (remote path, local path).
    pub fn missing_files(&self) -> Vec<(&'static str, PathBuf)> {
        let dir = self.checkpoint_dir();
        CHECKPOINT_FILES
            .iter()
            .map(|(remote, local)| (*remote, dir.join(local)))
            .filter(|(_, path)| !path.exists())
            .collect()
    }

    /// Checks if every checkpoint file is present.
    pub fn is_checkpoint_installed(&self) -> bool {
        self.missing_files().is_empty()
    }

    /// Returns the path to the ONNX Runtime library.
    pub fn onnx_runtime_path(&self) -> PathBuf {
        self.lib_dir.join(ONNX_RUNTIME_LIB)
    }

    /// Checks if ONNX Runtime is installed.
    pub fn is_runtime_installed(&self) -> bool {
        self.onnx_runtime_path().exists()
    }

    /// Downloads any missing checkpoint file.
    pub async fn ensure_checkpoint(
        &self,
        progress: Option<ProgressCallback>,
    ) -> Result<PathBuf, DownloadError> {
        let missing = self.missing_files();
        if missing.is_empty() {
            report(&progress, DownloadProgress::complete("Checkpoint already installed"));
            return Ok(self.checkpoint_dir());
        }

        fs::create_dir_all(self.checkpoint_dir())?;

        for (remote, local) in missing {
            let url = self.file_url(remote);
            tracing::info!("Downloading {} to {:?}", url, local);
            report(&progress, DownloadProgress::new(format!("Downloading {}...", remote), 0, None));

            let fetched = fetch(&url).await?;
            write_atomically(&local, &fetched.bytes)?;

            report(&progress, fetched.progress(format!("Saved {}", remote)));
        }

        report(&progress, DownloadProgress::complete("Checkpoint installed"));
        Ok(self.checkpoint_dir())
    }

    /// Downloads ONNX Runtime if not already installed.
    pub async fn ensure_runtime(
        &self,
        progress: Option<ProgressCallback>,
    ) -> Result<PathBuf, DownloadError> {
        if self.is_runtime_installed() {
            report(&progress, DownloadProgress::complete("ONNX Runtime already installed"));
            return Ok(self.onnx_runtime_path());
        }

        if ONNX_RUNTIME_URL.is_empty() {
            return Err(DownloadError::NotFound(
                "ONNX Runtime not available for this platform".to_string(),
            ));
        }

        fs::create_dir_all(&self.lib_dir)?;
        report(
            &progress,
            DownloadProgress::new(
                format!("Downloading ONNX Runtime v{}...", ONNX_RUNTIME_VERSION),
                0,
                None,
            ),
        );

        let fetched = fetch(ONNX_RUNTIME_URL).await?;
        report(&progress, fetched.progress("Extracting ONNX Runtime..."));

        #[cfg(target_os = "windows")]
        extract_zip(&fetched.bytes, ONNX_RUNTIME_LIB, &self.onnx_runtime_path())?;
        #[cfg(not(target_os = "windows"))]
        extract_tgz(&fetched.bytes, ONNX_RUNTIME_LIB, &self.onnx_runtime_path())?;

        report(&progress, DownloadProgress::complete("ONNX Runtime installed"));
        Ok(self.onnx_runtime_path())
    }

    /// Points `ort` at the downloaded runtime, if present.
    ///
    /// Must run before the first session is built. An existing
    /// `ORT_DYLIB_PATH` is left alone.
    pub fn setup_environment(&self) -> bool {
        if std::env::var_os(ORT_DYLIB_ENV).is_some() {
            return true;
        }
        if !self.is_runtime_installed() {
            return false;
        }

        let lib_path = self.onnx_runtime_path();
        std::env::set_var(ORT_DYLIB_ENV, &lib_path);
        tracing::info!("Set {} to {:?}", ORT_DYLIB_ENV, lib_path);
        true
    }
}

/// Whether an archive member is the runtime library `lib_name` names.
///
/// Linux ships `libonnxruntime.so.<version>`, macOS ships
/// `libonnxruntime.<version>.dylib`; the unversioned names are symlinks.
#[cfg(not(target_os = "windows"))]
fn matches_runtime_library(file_name: &str, lib_name: &str) -> bool {
    match lib_name.strip_suffix(".dylib") {
        Some(stem) => {
            file_name.starts_with(&format!("{}.", stem)) && file_name.ends_with(".dylib")
        }
        None => file_name.starts_with(lib_name),
    }
}

/// Extracts the runtime library from a ZIP archive (Windows).
#[cfg(target_os = "windows")]
fn extract_zip(data: &[u8], lib_name: &str, dest: &Path) -> Result<(), DownloadError> {
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    let mut archive =
        ZipArchive::new(Cursor::new(data)).map_err(|e| DownloadError::Archive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| DownloadError::Archive(e.to_string()))?;
        if file.name().ends_with(lib_name) {
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)?;
            return write_atomically(dest, &buffer);
        }
    }

    Err(DownloadError::Archive(format!(
        "{} not found in archive",
        lib_name
    )))
}

/// Extracts the runtime library from a tar.gz archive (Linux/macOS).
///
/// The library is read fully before anything is written, so a corrupt
/// archive leaves nothing at `dest`.
#[cfg(not(target_os = "windows"))]
fn extract_tgz(data: &[u8], lib_name: &str, dest: &Path) -> Result<(), DownloadError> {
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(data));
    let entries = archive
        .entries()
        .map_err(|e| DownloadError::Archive(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| DownloadError::Archive(e.to_string()))?;
        let is_lib = entry
            .path()
            .map_err(|e| DownloadError::Archive(e.to_string()))?
            .file_name()
            .is_some_and(|n| matches_runtime_library(&n.to_string_lossy(), lib_name));

        if is_lib && entry.header().entry_type().is_file() {
            let expected = entry
                .header()
                .size()
                .map_err(|e| DownloadError::Archive(e.to_string()))?;
            let mut buffer = Vec::new();
            entry
                .read_to_end(&mut buffer)
                .map_err(|e| DownloadError::Archive(e.to_string()))?;
            if buffer.len() as u64 != expected {
                return Err(DownloadError::Archive(format!(
                    "{} truncated: {} of {} bytes",
                    lib_name,
                    buffer.len(),
                    expected
                )));
            }
            return write_atomically(dest, &buffer);
        }
    }

    Err(DownloadError::Archive(format!(
        "{} not found in archive",
        lib_name
    )))
}

fn report(progress: &Option<ProgressCallback>, update: DownloadProgress) {
    if let Some(cb) = progress {
        cb(update);
    }
}

/// A downloaded body and the size the server announced.
struct Fetched {
    bytes: Vec<u8>,
    content_length: Option<u64>,
}

impl Fetched {
    fn progress(&self, step: impl Into<String>) -> DownloadProgress {
        DownloadProgress::new(step, self.bytes.len() as u64, self.content_length)
    }
}

async fn fetch(url: &str) -> Result<Fetched, DownloadError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| DownloadError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(DownloadError::InvalidResponse(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    let content_length = response.content_length();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| DownloadError::Network(e.to_string()))?;
    Ok(Fetched {
        bytes: bytes.to_vec(),
        content_length,
    })
}

/// Writes to a sibling temp file and renames, so a partial download never
/// looks installed.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    let tmp = path.with_extension("part");
    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
