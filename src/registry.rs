//! Dedup Registry
//!
//! The single authority over discovered contracts. Every admission, from every
//! ingestion path, goes through one mutex: read, compare, prepend, persist.
//!
//! Two files are kept in step:
//! - a JSON array of `{address, method}`, newest first
//! - a newline-delimited list of addresses in the same order
//!
//! The JSON file is the source of truth; the mirror is rebuilt from it on open
//! if the two ever disagree.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use alloy::primitives::{Address, Selector, TxHash};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::decoder::format_address;

/// Placeholder written wherever a method selector could not be resolved
pub const UNKNOWN_METHOD: &str = "unknown";

/// Errors that can occur while loading or persisting the registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt registry file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Which ingestion path produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Chain,
    Api,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateSource::Chain => f.write_str("chain"),
            CandidateSource::Api => f.write_str("api"),
        }
    }
}

/// An observed deployment, not yet admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: Address,
    /// `None` when the creation transaction could not be resolved
    pub method: Option<Selector>,
    pub source_tx: TxHash,
    pub source: CandidateSource,
}

/// An admitted contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEntry {
    #[serde(with = "lowercase_address")]
    pub address: Address,
    #[serde(default)]
    pub method: Option<Selector>,
}

impl ContractEntry {
    pub fn new(address: Address, method: Option<Selector>) -> Self {
        Self { address, method }
    }

    /// Lowercase hex address
    pub fn address_hex(&self) -> String {
        format_address(self.address)
    }

    /// Hex selector, or the unknown placeholder
    pub fn method_label(&self) -> String {
        self.method
            .map(|selector| selector.to_string())
            .unwrap_or_else(|| UNKNOWN_METHOD.to_string())
    }
}

mod lowercase_address {
    use alloy::primitives::Address;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::decoder::{format_address, parse_address};

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_address(*address))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_address(&raw).map_err(de::Error::custom)
    }
}

/// Result of offering a candidate to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Newly recorded and persisted
    Admitted(ContractEntry),
    /// Address already present; nothing changed
    Duplicate,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

/// Where the two registry views are written
#[derive(Debug, Clone)]
pub struct RegistryFiles {
    pub structured: PathBuf,
    pub mirror: PathBuf,
}

impl RegistryFiles {
    pub fn new(structured: impl Into<PathBuf>, mirror: impl Into<PathBuf>) -> Self {
        Self {
            structured: structured.into(),
            mirror: mirror.into(),
        }
    }

    /// Replace both views with `entries`.
    ///
    /// Both temp files are fully written before either is renamed into place,
    /// so the two renames run back to back. If the mirror rename fails and
    /// `previous` is given, the structured view is put back to it.
    fn write(&self, entries: &[ContractEntry], previous: Option<&[ContractEntry]>) -> Result<(), RegistryError> {
        let structured = stage(&self.structured, &serde_json::to_vec_pretty(entries)?)?;
        let mirror = stage(&self.mirror, render_mirror(entries).as_bytes())?;

        commit(structured, &self.structured)?;

        if let Err(e) = commit(mirror, &self.mirror) {
            if let Some(previous) = previous {
                // Put the structured view back so both still describe the same set
                let restored = serde_json::to_vec_pretty(previous)
                    .map_err(RegistryError::from)
                    .and_then(|bytes| write_atomic(&self.structured, &bytes));
                if let Err(restore_err) = restored {
                    error!(error = %restore_err, "Failed to restore structured registry after mirror write failure");
                }
            }
            return Err(e);
        }

        Ok(())
    }
}

struct State {
    entries: Vec<ContractEntry>,
    index: HashSet<Address>,
}

/// Append-only, deduplicated record of discovered contracts
pub struct Registry {
    files: RegistryFiles,
    state: Mutex<State>,
}

impl Registry {
    /// Load existing state from disk, creating or repairing the files as needed
    pub fn open(files: RegistryFiles) -> Result<Self, RegistryError> {
        let loaded = load_entries(&files)?;

        let mut index = HashSet::with_capacity(loaded.len());
        let entries: Vec<ContractEntry> = loaded
            .into_iter()
            .filter(|entry| index.insert(entry.address))
            .collect();

        let structured_text = read_optional(&files.structured)?;
        let mirror_text = read_optional(&files.mirror)?;
        let structured_ok = structured_text
            .as_deref()
            .and_then(|text| serde_json::from_str::<Vec<ContractEntry>>(text).ok())
            .is_some_and(|on_disk| on_disk == entries);
        let mirror_ok = mirror_text.as_deref() == Some(render_mirror(&entries).as_str());

        if !structured_ok || !mirror_ok {
            info!(
                entries = entries.len(),
                path = %files.structured.display(),
                "Writing registry files"
            );
            files.write(&entries, None)?;
        }

        info!(
            entries = entries.len(),
            path = %files.structured.display(),
            "Registry loaded"
        );

        Ok(Self {
            files,
            state: Mutex::new(State { entries, index }),
        })
    }

    /// Record `candidate` unless its address is already present.
    ///
    /// Runs entirely under the registry lock. On a persistence error nothing is
    /// recorded in memory either, so a retry later sees the same state.
    pub async fn admit(&self, candidate: &Candidate) -> Result<Admission, RegistryError> {
        let mut state = self.state.lock().await;

        if state.index.contains(&candidate.address) {
            return Ok(Admission::Duplicate);
        }

        let entry = ContractEntry::new(candidate.address, candidate.method);
        state.entries.insert(0, entry.clone());

        if let Err(e) = self.files.write(&state.entries, Some(&state.entries[1..])) {
            state.entries.remove(0);
            return Err(e);
        }

        state.index.insert(candidate.address);
        Ok(Admission::Admitted(entry))
    }

    /// All entries, newest first
    pub async fn entries(&self) -> Vec<ContractEntry> {
        self.state.lock().await.entries.clone()
    }

    /// All addresses, newest first
    pub async fn addresses(&self) -> Vec<Address> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|entry| entry.address)
            .collect()
    }

    pub async fn contains(&self, address: &Address) -> bool {
        self.state.lock().await.index.contains(address)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn files(&self) -> &RegistryFiles {
        &self.files
    }
}

/// One lowercase address per line, newest first
pub fn render_mirror(entries: &[ContractEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}\n", entry.address_hex()))
        .collect()
}

fn load_entries(files: &RegistryFiles) -> Result<Vec<ContractEntry>, RegistryError> {
    let structured = read_optional(&files.structured)?.filter(|text| !text.trim().is_empty());
    if let Some(text) = structured {
        return serde_json::from_str(&text).map_err(|e| RegistryError::Corrupt {
            path: files.structured.display().to_string(),
            reason: e.to_string(),
        });
    }

    // Only the plain list survived: rebuild from it with unresolved methods
    if let Some(text) = read_optional(&files.mirror)? {
        warn!(
            path = %files.mirror.display(),
            "Structured registry missing or empty, rebuilding from address list"
        );
        return text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                crate::decoder::parse_address(line)
                    .map(|address| ContractEntry::new(address, None))
                    .map_err(|e| RegistryError::Corrupt {
                        path: files.mirror.display().to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect();
    }

    Ok(Vec::new())
}

fn read_optional(path: &Path) -> Result<Option<String>, RegistryError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(RegistryError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Write `bytes` to a synced temp file next to `path`, ready to be renamed over it
fn stage(path: &Path, bytes: &[u8]) -> Result<NamedTempFile, RegistryError> {
    let io_err = |source: std::io::Error| RegistryError::Io {
        path: path.display().to_string(),
        source,
    };

    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    Ok(tmp)
}

/// Rename a staged file into place
fn commit(tmp: NamedTempFile, path: &Path) -> Result<(), RegistryError> {
    tmp.persist(path).map_err(|e| RegistryError::Io {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

/// Write via a sibling temp file and rename, so readers never see a partial file
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    commit(stage(path, bytes)?, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, fixed_bytes};
    use std::sync::Arc;

    const CREATION: Selector = fixed_bytes!("60806040");

    fn candidate(address: Address, source: CandidateSource) -> Candidate {
        Candidate {
            address,
            method: Some(CREATION),
            source_tx: TxHash::ZERO,
            source,
        }
    }

    fn temp_files(dir: &tempfile::TempDir) -> RegistryFiles {
        RegistryFiles::new(dir.path().join("contracts.json"), dir.path().join("contracts.txt"))
    }

    fn read_json(path: &Path) -> Vec<ContractEntry> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn read_mirror(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    // ==================== admit tests ====================

    #[tokio::test]
    async fn test_admit_new_address() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(temp_files(&dir)).unwrap();

        let addr = address!("fffd933a0bc612844eaf0c6fe3e5b8e9b6c1d19c");
        let result = registry.admit(&candidate(addr, CandidateSource::Chain)).await.unwrap();

        assert_eq!(result, Admission::Admitted(ContractEntry::new(addr, Some(CREATION))));
        assert!(registry.contains(&addr).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_admit_duplicate_rejected_across_sources() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(temp_files(&dir)).unwrap();
        let addr = Address::repeat_byte(0xab);

        assert!(registry.admit(&candidate(addr, CandidateSource::Chain)).await.unwrap().is_admitted());
        assert_eq!(
            registry.admit(&candidate(addr, CandidateSource::Api)).await.unwrap(),
            Admission::Duplicate
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_entries_are_newest_first_and_views_agree() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        let registry = Registry::open(files.clone()).unwrap();

        for byte in [0x01u8, 0x02, 0x03] {
            registry
                .admit(&candidate(Address::repeat_byte(byte), CandidateSource::Chain))
                .await
                .unwrap();
        }

        let expected = vec![
            Address::repeat_byte(0x03),
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x01),
        ];
        assert_eq!(registry.addresses().await, expected);

        let structured: Vec<Address> = read_json(&files.structured).iter().map(|e| e.address).collect();
        let mirror = read_mirror(&files.mirror);
        assert_eq!(structured, expected);
        assert_eq!(
            mirror,
            expected.iter().map(|a| format_address(*a)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_persisted_format_is_lowercase_with_unknown_method() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        let registry = Registry::open(files.clone()).unwrap();

        let addr = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let mut unresolved = candidate(addr, CandidateSource::Api);
        unresolved.method = None;
        registry.admit(&unresolved).await.unwrap();

        let raw = std::fs::read_to_string(&files.structured).unwrap();
        assert!(raw.contains("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"));
        assert!(raw.contains("null"));
        assert_eq!(
            std::fs::read_to_string(&files.mirror).unwrap(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266\n"
        );
    }

    #[tokio::test]
    async fn test_concurrent_admits_same_address_only_one_wins() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(temp_files(&dir)).unwrap());
        let addr = Address::repeat_byte(0x42);

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            let source = if i % 2 == 0 { CandidateSource::Chain } else { CandidateSource::Api };
            handles.push(tokio::spawn(async move {
                registry.admit(&candidate(addr, source)).await.unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_admitted() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admits_distinct_addresses_all_win() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        let registry = Arc::new(Registry::open(files.clone()).unwrap());

        let mut handles = Vec::new();
        for byte in 0..32u8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .admit(&candidate(Address::repeat_byte(byte), CandidateSource::Chain))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_admitted());
        }

        assert_eq!(registry.len().await, 32);
        let structured: HashSet<Address> = read_json(&files.structured).iter().map(|e| e.address).collect();
        let mirror: HashSet<Address> = read_mirror(&files.mirror)
            .iter()
            .map(|line| crate::decoder::parse_address(line).unwrap())
            .collect();
        assert_eq!(structured.len(), 32);
        assert_eq!(structured, mirror);
    }

    // ==================== persistence failure tests ====================

    #[tokio::test]
    async fn test_persistence_failure_is_not_an_admission() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        let registry = Registry::open(files).unwrap();

        // Swap in unwritable targets after opening
        let broken = Registry {
            files: RegistryFiles::new("/nonexistent/dir/contracts.json", "/nonexistent/dir/contracts.txt"),
            state: Mutex::new(State {
                entries: registry.entries().await,
                index: HashSet::new(),
            }),
        };

        let addr = Address::repeat_byte(0x77);
        let result = broken.admit(&candidate(addr, CandidateSource::Chain)).await;

        assert!(matches!(result, Err(RegistryError::Io { .. })));
        assert!(!broken.contains(&addr).await);
        assert_eq!(broken.len().await, 0);
    }

    #[tokio::test]
    async fn test_mirror_failure_restores_structured_view() {
        let dir = tempfile::tempdir().unwrap();
        let structured = dir.path().join("contracts.json");
        let registry = Registry::open(RegistryFiles::new(&structured, dir.path().join("contracts.txt"))).unwrap();
        registry
            .admit(&candidate(Address::repeat_byte(0x01), CandidateSource::Chain))
            .await
            .unwrap();

        let broken = Registry {
            files: RegistryFiles::new(&structured, "/nonexistent/dir/contracts.txt"),
            state: Mutex::new(State {
                entries: registry.entries().await,
                index: HashSet::from([Address::repeat_byte(0x01)]),
            }),
        };

        let result = broken
            .admit(&candidate(Address::repeat_byte(0x02), CandidateSource::Chain))
            .await;

        assert!(result.is_err());
        let on_disk: Vec<Address> = read_json(&structured).iter().map(|e| e.address).collect();
        assert_eq!(on_disk, vec![Address::repeat_byte(0x01)]);
    }

    #[tokio::test]
    async fn test_unstageable_mirror_leaves_both_views_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        let registry = Registry::open(files.clone()).unwrap();
        registry
            .admit(&candidate(Address::repeat_byte(0x01), CandidateSource::Chain))
            .await
            .unwrap();
        let structured_before = std::fs::read(&files.structured).unwrap();

        let broken = Registry {
            files: RegistryFiles::new(&files.structured, dir.path().join("missing").join("contracts.txt")),
            state: Mutex::new(State {
                entries: registry.entries().await,
                index: HashSet::from([Address::repeat_byte(0x01)]),
            }),
        };
        assert!(broken
            .admit(&candidate(Address::repeat_byte(0x02), CandidateSource::Chain))
            .await
            .is_err());

        // The mirror couldn't be staged, so the structured file was never renamed
        assert_eq!(std::fs::read(&files.structured).unwrap(), structured_before);
        assert_eq!(
            read_mirror(&files.mirror),
            vec!["0x0101010101010101010101010101010101010101".to_string()]
        );
    }

    #[tokio::test]
    async fn test_admit_leaves_no_staged_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(temp_files(&dir)).unwrap();
        for byte in 1..=3u8 {
            registry
                .admit(&candidate(Address::repeat_byte(byte), CandidateSource::Api))
                .await
                .unwrap();
        }

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["contracts.json", "contracts.txt"]);
    }

    // ==================== open / recovery tests ====================

    #[tokio::test]
    async fn test_reopen_preserves_state_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        let addr = Address::repeat_byte(0x09);

        {
            let registry = Registry::open(files.clone()).unwrap();
            registry.admit(&candidate(addr, CandidateSource::Chain)).await.unwrap();
        }

        let reopened = Registry::open(files).unwrap();
        assert!(reopened.contains(&addr).await);
        assert_eq!(
            reopened.admit(&candidate(addr, CandidateSource::Api)).await.unwrap(),
            Admission::Duplicate
        );
    }

    #[test]
    fn test_open_creates_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        Registry::open(files.clone()).unwrap();

        assert_eq!(std::fs::read_to_string(&files.structured).unwrap().trim(), "[]");
        assert_eq!(std::fs::read_to_string(&files.mirror).unwrap(), "");
    }

    #[tokio::test]
    async fn test_open_repairs_stale_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        std::fs::write(
            &files.structured,
            r#"[{"address":"0x0101010101010101010101010101010101010101","method":"0x60806040"}]"#,
        )
        .unwrap();
        std::fs::write(&files.mirror, "0x0202020202020202020202020202020202020202\n").unwrap();

        let registry = Registry::open(files.clone()).unwrap();

        assert_eq!(registry.addresses().await, vec![Address::repeat_byte(0x01)]);
        assert_eq!(
            read_mirror(&files.mirror),
            vec!["0x0101010101010101010101010101010101010101".to_string()]
        );
    }

    #[tokio::test]
    async fn test_open_drops_duplicate_entries_keeping_newest() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        std::fs::write(
            &files.structured,
            r#"[
                {"address":"0x0101010101010101010101010101010101010101","method":"0x60806040"},
                {"address":"0x0101010101010101010101010101010101010101","method":null}
            ]"#,
        )
        .unwrap();

        let registry = Registry::open(files).unwrap();
        let entries = registry.entries().await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].method, Some(CREATION));
    }

    #[tokio::test]
    async fn test_open_rebuilds_from_mirror_only() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        std::fs::write(&files.mirror, "0x0303030303030303030303030303030303030303\n").unwrap();

        let registry = Registry::open(files.clone()).unwrap();

        assert_eq!(
            registry.entries().await,
            vec![ContractEntry::new(Address::repeat_byte(0x03), None)]
        );
        assert_eq!(read_json(&files.structured).len(), 1);
    }

    #[tokio::test]
    async fn test_open_blank_structured_file_falls_back_to_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        std::fs::write(&files.structured, "  \n").unwrap();
        std::fs::write(&files.mirror, "0x0404040404040404040404040404040404040404\n").unwrap();

        let registry = Registry::open(files.clone()).unwrap();

        assert_eq!(registry.addresses().await, vec![Address::repeat_byte(0x04)]);
        assert_eq!(
            read_mirror(&files.mirror),
            vec!["0x0404040404040404040404040404040404040404".to_string()]
        );
        assert_eq!(read_json(&files.structured).len(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_reports_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        std::fs::write(&files.mirror, "0x0505050505050505050505050505050505050505\n").unwrap();

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || Registry::open(files).unwrap());

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("Registry loaded").count(), 1, "{output}");
        assert!(output.contains("entries=1"), "{output}");
    }

    #[test]
    fn test_open_corrupt_structured_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = temp_files(&dir);
        std::fs::write(&files.structured, "{not json").unwrap();

        assert!(matches!(Registry::open(files), Err(RegistryError::Corrupt { .. })));
    }

    // ==================== ContractEntry tests ====================

    #[test]
    fn test_method_label() {
        let known = ContractEntry::new(Address::ZERO, Some(CREATION));
        let unknown = ContractEntry::new(Address::ZERO, None);
        assert_eq!(known.method_label(), "0x60806040");
        assert_eq!(unknown.method_label(), UNKNOWN_METHOD);
    }

    #[test]
    fn test_entry_accepts_mixed_case_address_on_load() {
        let json = r#"{"address":"0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266","method":"0x60806040"}"#;
        let entry: ContractEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.address_hex(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    }
}
