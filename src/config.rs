//! Configuration for renter-repair.

use crate::contract::RevisionJournal;
use crate::repair::MemoryManager;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Timeouts and pricing tolerance for sector download sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Timeout for dialing a host, in seconds.
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,

    /// Deadline for a host settings round trip, in seconds.
    #[serde(default = "default_settings_timeout")]
    pub settings_timeout_secs: u64,

    /// Deadline for the RPC selector and recent-revision agreement, in seconds.
    #[serde(default = "default_recent_revision_timeout")]
    pub recent_revision_timeout_secs: u64,

    /// Deadline for sending the download action, in seconds.
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,

    /// Deadline for the signed-revision exchange, in seconds.
    #[serde(default = "default_revision_timeout")]
    pub revision_timeout_secs: u64,

    /// Deadline for receiving sector data, in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// How long an idle session stays usable, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Price inflation tolerated between renter and host, in thousandths.
    /// Default: 2 (0.2%).
    #[serde(default = "default_price_leeway")]
    pub price_leeway_per_mille: u32,
}

impl DownloaderConfig {
    /// Dial timeout.
    #[must_use]
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// Settings round-trip deadline.
    #[must_use]
    pub fn settings_timeout(&self) -> Duration {
        Duration::from_secs(self.settings_timeout_secs)
    }

    /// Handshake deadline.
    #[must_use]
    pub fn recent_revision_timeout(&self) -> Duration {
        Duration::from_secs(self.recent_revision_timeout_secs)
    }

    /// Download action deadline.
    #[must_use]
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    /// Revision exchange deadline.
    #[must_use]
    pub fn revision_timeout(&self) -> Duration {
        Duration::from_secs(self.revision_timeout_secs)
    }

    /// Sector payload deadline.
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Idle keep-alive window.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: default_dial_timeout(),
            settings_timeout_secs: default_settings_timeout(),
            recent_revision_timeout_secs: default_recent_revision_timeout(),
            action_timeout_secs: default_action_timeout(),
            revision_timeout_secs: default_revision_timeout(),
            download_timeout_secs: default_download_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            price_leeway_per_mille: default_price_leeway(),
        }
    }
}

const fn default_dial_timeout() -> u64 {
    45
}

const fn default_settings_timeout() -> u64 {
    60
}

const fn default_recent_revision_timeout() -> u64 {
    120
}

const fn default_action_timeout() -> u64 {
    120
}

const fn default_revision_timeout() -> u64 {
    120
}

const fn default_download_timeout() -> u64 {
    600 // 10 minutes for a full sector on a slow link
}

const fn default_idle_timeout() -> u64 {
    3600
}

const fn default_price_leeway() -> u32 {
    2
}

/// Top-level repair configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Sector download session settings.
    #[serde(default)]
    pub downloader: DownloaderConfig,

    /// Directory for the fallback revision journal.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,

    /// Bytes of chunk data the repair pipeline may hold in memory.
    #[serde(default = "default_memory_budget")]
    pub memory_budget_bytes: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            downloader: DownloaderConfig::default(),
            journal_dir: default_journal_dir(),
            memory_budget_bytes: default_memory_budget(),
        }
    }
}

impl RepairConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Open the revision journal under [`journal_dir`](Self::journal_dir).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open_journal(&self) -> crate::Result<RevisionJournal> {
        RevisionJournal::open(self.journal_dir.clone()).await
    }

    /// Memory manager sized to [`memory_budget_bytes`](Self::memory_budget_bytes).
    #[must_use]
    pub fn memory_manager(&self) -> MemoryManager {
        MemoryManager::new(self.memory_budget_bytes)
    }
}

fn default_journal_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "renter-repair").map_or_else(
        || PathBuf::from(".renter-repair"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

const fn default_memory_budget() -> u64 {
    1 << 30 // 1 GiB
}
