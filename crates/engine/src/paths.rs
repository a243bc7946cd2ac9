//! File naming for a base directory.
//!
//! Every managed file has a primary path and a `_tmp` shadow beside it. Write
//! sessions only ever touch shadows; close promotes them by rename. The
//! lists returned by [`BasePaths::managed`] and [`ShardPaths::managed`] are
//! the complete set of shadows a session can create, so promotion and
//! cleanup iterate them instead of scanning directories.

use std::path::{Path, PathBuf};
use store::{with_suffix, CompactionPaths};

/// Suffix that turns a primary file name into its shadow.
pub const SHADOW_SUFFIX: &str = "_tmp";
/// Suffix of a shadow that is still being copied.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Subdirectory holding postings shards.
pub const POS_DIR: &str = "pos";

pub const FILEDATA: &str = "filedata";
pub const FILEDATA_SIZE: &str = "filedata_size";
pub const FILEDATA_INDEX: &str = "filedata_index";
pub const DELETEFILE: &str = "deletefile";
pub const SIZE: &str = "size";
pub const DOMAINID: &str = "domainid";
pub const SCORE: &str = "score";
pub const FILEKEYWORDNUM: &str = "filekeywordnum";
pub const URLLEN: &str = "urllen";
pub const KEYWORD_TOTALNUM: &str = "keyword_totalnum";
pub const KEYWORD_DOCSNUM: &str = "keyword_docsnum";
pub const FILENUM: &str = "filenum";
pub const DOMAINNUM: &str = "domainnum";
pub const KEYWORDNUM: &str = "keywordnum";

/// A primary file and its write-session shadow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedFile {
    pub primary: PathBuf,
    pub shadow: PathBuf,
}

impl ManagedFile {
    pub fn new(primary: PathBuf) -> Self {
        let shadow = with_suffix(&primary, SHADOW_SUFFIX);
        Self { primary, shadow }
    }

    /// Where a shadow copy is staged before it is renamed into place.
    #[must_use]
    pub fn partial(&self) -> PathBuf {
        with_suffix(&self.shadow, PARTIAL_SUFFIX)
    }

    /// The file a session in `write` mode should open.
    #[must_use]
    pub fn active(&self, write: bool) -> &Path {
        if write {
            &self.shadow
        } else {
            &self.primary
        }
    }
}

/// All store files directly under one base directory.
#[derive(Debug, Clone)]
pub struct BasePaths {
    pub base_dir: PathBuf,
    pub pos_dir: PathBuf,
    pub filedata: ManagedFile,
    pub filedata_size: ManagedFile,
    pub filedata_index: ManagedFile,
    pub deletefile: ManagedFile,
    pub size: ManagedFile,
    pub domainid: ManagedFile,
    pub score: ManagedFile,
    pub filekeywordnum: ManagedFile,
    pub urllen: ManagedFile,
    pub keyword_totalnum: ManagedFile,
    pub keyword_docsnum: ManagedFile,
    pub filenum: ManagedFile,
    pub domainnum: ManagedFile,
    pub keywordnum: ManagedFile,
}

impl BasePaths {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let f = |name: &str| ManagedFile::new(base_dir.join(name));
        Self {
            pos_dir: base_dir.join(POS_DIR),
            filedata: f(FILEDATA),
            filedata_size: f(FILEDATA_SIZE),
            filedata_index: f(FILEDATA_INDEX),
            deletefile: f(DELETEFILE),
            size: f(SIZE),
            domainid: f(DOMAINID),
            score: f(SCORE),
            filekeywordnum: f(FILEKEYWORDNUM),
            urllen: f(URLLEN),
            keyword_totalnum: f(KEYWORD_TOTALNUM),
            keyword_docsnum: f(KEYWORD_DOCSNUM),
            filenum: f(FILENUM),
            domainnum: f(DOMAINNUM),
            keywordnum: f(KEYWORDNUM),
            base_dir,
        }
    }

    /// Files whose contents a write session copies into shadows at open.
    pub fn data_files(&self) -> [&ManagedFile; 11] {
        [
            &self.filedata,
            &self.filedata_size,
            &self.filedata_index,
            &self.deletefile,
            &self.size,
            &self.domainid,
            &self.score,
            &self.filekeywordnum,
            &self.urllen,
            &self.keyword_totalnum,
            &self.keyword_docsnum,
        ]
    }

    /// Count files. Their shadows are written when a count changes, never
    /// copied from the primary.
    pub fn count_files(&self) -> [&ManagedFile; 3] {
        [&self.filenum, &self.domainnum, &self.keywordnum]
    }

    /// Every file a base write session may shadow.
    pub fn managed(&self) -> Vec<&ManagedFile> {
        let mut all = self.data_files().to_vec();
        all.extend(self.count_files());
        all
    }

    /// The filedata store's shadow files, as compaction sees them.
    pub fn filedata_compaction(&self) -> CompactionPaths {
        CompactionPaths {
            data: self.filedata.shadow.clone(),
            sizes: self.filedata_size.shadow.clone(),
            offsets: self.filedata_index.shadow.clone(),
        }
    }
}

/// The three files of one postings shard under `pos/`.
#[derive(Debug, Clone)]
pub struct ShardPaths {
    pub shard_id: u32,
    pub data: ManagedFile,
    pub sizes: ManagedFile,
    pub offsets: ManagedFile,
}

impl ShardPaths {
    pub fn new<P: AsRef<Path>>(base_dir: P, shard_id: u32) -> Self {
        let dir = base_dir.as_ref().join(POS_DIR);
        Self {
            shard_id,
            data: ManagedFile::new(dir.join(shard_id.to_string())),
            sizes: ManagedFile::new(dir.join(format!("{shard_id}_size"))),
            offsets: ManagedFile::new(dir.join(format!("{shard_id}_index"))),
        }
    }

    pub fn managed(&self) -> [&ManagedFile; 3] {
        [&self.data, &self.sizes, &self.offsets]
    }

    /// `true` if every primary file of the shard exists.
    #[must_use]
    pub fn primaries_exist(&self) -> bool {
        self.managed().iter().all(|f| f.primary.exists())
    }

    /// The shard's shadow files, as compaction sees them.
    pub fn compaction(&self) -> CompactionPaths {
        CompactionPaths {
            data: self.data.shadow.clone(),
            sizes: self.sizes.shadow.clone(),
            offsets: self.offsets.shadow.clone(),
        }
    }
}
