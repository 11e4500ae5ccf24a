//! The reader facade: companion-file resolution and the one-pass pipeline.
//!
//! A project on disk is a directory holding an `.apNN` XML wrapper (project
//! name and compatibility version) and the binary container at
//! `System/PEData.plf`. [`Reader::open`] accepts the directory, the wrapper,
//! or the container path and resolves the rest; missing companions degrade
//! to defaults instead of failing.
//!
//! The pipeline runs strictly upward: preamble, framing, verification,
//! reconciliation, model assembly. The source file is never written.

use crate::container::{
    BlockFramer, Frame, IntegrityVerifier, Preamble, TrustLevel,
};
use crate::error::{Error, Result};
use crate::model::{build_model, ProjectModel};
use crate::reconcile::reconcile;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Name of the container file inside a project's `System` directory
pub const CONTAINER_FILE: &str = "PEData.plf";

/// Read behavior configuration.
///
/// ```
/// use plfread_core::ReaderOptions;
///
/// let options = ReaderOptions::new().strict(true);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    pub(crate) strict: bool,
}

impl ReaderOptions {
    /// Default options: integrity failures warn and continue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the read with [`Error::Integrity`] on the first block whose
    /// signature fails verification. Default is to flag the derived entity
    /// untrusted and keep going.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// True for wrapper files named like `<project>.ap17`.
fn is_wrapper_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.strip_prefix("ap"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Finds the lexically first `.apNN` wrapper in `dir`, if any.
fn find_wrapper(dir: &Path) -> Option<PathBuf> {
    let mut wrappers: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_wrapper_path(p))
        .collect();
    wrappers.sort();
    wrappers.into_iter().next()
}

/// Resolved on-disk layout of one project.
#[derive(Debug)]
struct ProjectPaths {
    container: PathBuf,
    wrapper: Option<PathBuf>,
    fallback_name: String,
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn resolve(path: &Path) -> ProjectPaths {
    if path.is_dir() {
        return ProjectPaths {
            container: path.join("System").join(CONTAINER_FILE),
            wrapper: find_wrapper(path),
            fallback_name: dir_name(path),
        };
    }
    if is_wrapper_path(path) {
        let project_dir = path.parent().unwrap_or(Path::new("."));
        let fallback_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir_name(project_dir));
        return ProjectPaths {
            container: project_dir.join("System").join(CONTAINER_FILE),
            wrapper: Some(path.to_path_buf()),
            fallback_name,
        };
    }
    // A direct container path; the project directory is above `System`.
    let parent = path.parent().unwrap_or(Path::new("."));
    let project_dir = if parent.file_name().is_some_and(|n| n == "System") {
        parent.parent().unwrap_or(parent)
    } else {
        parent
    };
    ProjectPaths {
        container: path.to_path_buf(),
        wrapper: find_wrapper(project_dir),
        fallback_name: dir_name(project_dir),
    }
}

/// Extracts `Name` and `ProjectCompatibilityVersion` from the wrapper's root
/// element. The wrapper is advisory, so any parse problem yields no values
/// rather than an error.
fn parse_wrapper(content: &str) -> (Option<String>, Option<String>) {
    let mut reader = XmlReader::from_str(content);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let mut name = None;
                let mut version = None;
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    match key.as_str() {
                        "Name" => name = Some(value),
                        "ProjectCompatibilityVersion" => version = Some(value),
                        _ => {}
                    }
                }
                return (name, version);
            }
            Ok(Event::Eof) => return (None, None),
            Err(err) => {
                warn!(%err, "unparseable project wrapper; ignoring");
                return (None, None);
            }
            _ => {}
        }
    }
}

/// An opened project container, ready to be read.
#[derive(Debug)]
pub struct Reader {
    container_path: PathBuf,
    project_name: String,
    version_hint: Option<String>,
    data: Vec<u8>,
    options: ReaderOptions,
}

impl Reader {
    /// Opens a project with default options.
    ///
    /// `path` may be the project directory, its `.apNN` wrapper, or the
    /// `PEData.plf` container itself.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    /// Opens a project with explicit options.
    pub fn open_with(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let paths = resolve(path.as_ref());
        trace!(container = %paths.container.display(), "resolved project layout");

        let data = fs::read(&paths.container)
            .map_err(|e| Error::file_read(&paths.container, e))?;

        let (wrapper_name, wrapper_version) = match &paths.wrapper {
            Some(wrapper) => match fs::read_to_string(wrapper) {
                Ok(content) => parse_wrapper(&content),
                Err(err) => {
                    warn!(wrapper = %wrapper.display(), %err, "unreadable project wrapper");
                    (None, None)
                }
            },
            None => (None, None),
        };

        let project_name = wrapper_name.unwrap_or(paths.fallback_name);
        debug!(
            project = %project_name,
            bytes = data.len(),
            wrapper = paths.wrapper.is_some(),
            "opened project container"
        );

        Ok(Self {
            container_path: paths.container,
            project_name,
            version_hint: wrapper_version,
            data,
            options,
        })
    }

    /// Path of the container file backing this reader.
    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    /// Project name, from the wrapper or the directory stem.
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Runs the full pipeline once and returns the reconstructed model.
    ///
    /// Reading the same container twice yields structurally equal models.
    pub fn read(&self) -> Result<ProjectModel> {
        let preamble = Preamble::parse(&self.data)?;
        let verifier = IntegrityVerifier::from_preamble(&preamble);

        let mut frames = Vec::new();
        let mut trust: HashMap<usize, TrustLevel> = HashMap::new();
        for frame in BlockFramer::new(&self.data, preamble.header.data_size) {
            let frame = frame?;
            if let Frame::Block(block) = &frame {
                let level = verifier.verify(block);
                if level == TrustLevel::Failed {
                    warn!(
                        block = block.index,
                        offset = block.offset,
                        "block signature failed verification"
                    );
                    if self.options.strict {
                        return Err(Error::Integrity {
                            block_index: block.index,
                            offset: block.offset,
                        });
                    }
                }
                trust.insert(block.index, level);
            }
            frames.push(frame);
        }

        let version = self
            .version_hint
            .clone()
            .unwrap_or_else(|| preamble.header.version.to_string());

        build_model(
            self.project_name.clone(),
            version,
            reconcile(frames),
            &trust,
        )
    }
}

/// Opens and reads a project in one call, with default options.
pub fn read_project(path: impl AsRef<Path>) -> Result<ProjectModel> {
    Reader::open(path)?.read()
}
