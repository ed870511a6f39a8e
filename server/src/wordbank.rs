//! Static catalog of named word lists
//!
//! Every regular file in the wordlist directory becomes one list, named
//! after the file with any `.txt` extension removed. Lines are trimmed and
//! blank lines dropped. The bank is immutable once loaded.

use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum WordBankError {
    #[error("wordlist directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct WordBank {
    lists: BTreeMap<String, Vec<String>>,
}

impl WordBank {
    /// Reads every wordlist file in `directory`
    ///
    /// Fails if the directory is missing or any file in it cannot be read
    /// as UTF-8 text. The server refuses to start in that case.
    pub fn load(directory: impl AsRef<Path>) -> Result<Self, WordBankError> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(WordBankError::MissingDirectory(directory.to_path_buf()));
        }

        let mut lists = BTreeMap::new();
        for entry in fs::read_dir(directory).map_err(io_err(directory))? {
            let entry = entry.map_err(io_err(directory))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            let name = file_name
                .strip_suffix(".txt")
                .unwrap_or(&file_name)
                .to_string();

            let contents = fs::read_to_string(&path).map_err(io_err(&path))?;
            let words = parse_words(&contents);
            debug!("Loaded wordlist {} ({} words)", name, words.len());
            lists.insert(name, words);
        }

        info!("Loaded {} wordlists from {}", lists.len(), directory.display());
        Ok(Self { lists })
    }

    /// Builds a bank from in-memory lists
    pub fn from_lists<I, N, W>(lists: I) -> Self
    where
        I: IntoIterator<Item = (N, Vec<W>)>,
        N: Into<String>,
        W: Into<String>,
    {
        Self {
            lists: lists
                .into_iter()
                .map(|(name, words)| (name.into(), words.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.lists.get(name).map(Vec::as_slice)
    }

    /// (name, word count) pairs sorted by name
    pub fn list_sizes(&self) -> Vec<(String, usize)> {
        self.lists
            .iter()
            .map(|(name, words)| (name.clone(), words.len()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> WordBankError {
    let path = path.to_path_buf();
    move |source| WordBankError::Io { path, source }
}

fn parse_words(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
