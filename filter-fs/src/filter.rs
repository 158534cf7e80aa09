use crate::config::Config;
use bloomd_core::{Error, FilterBackend, FilterConfig, FilterObject};
use rand::Rng;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use trace_err::TraceErrResult;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
#[cfg(windows)]
use std::os::windows::fs::OpenOptionsExt;

const MAGIC: u32 = 0x626c6d64; // "blmd"
const DATA_FILE: &str = "filter.bin";

fn direct_flag(options: &mut OpenOptions) {
    #[cfg(unix)]
    options.custom_flags(libc::O_SYNC);
    #[cfg(windows)]
    options.custom_flags(0x8000_0000); // FILE_FLAG_WRITE_THROUGH
}

/// Backend producing directory-per-filter, single-file-per-filter
/// on-disk Bloom filters under `config.data_dir`.
pub struct FsBackend {
    config: Config,
}

impl FsBackend {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn dir_for(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(format!("bloomd.{name}"))
    }
}

impl FilterBackend for FsBackend {
    fn init(
        &self,
        filter_config: &FilterConfig,
        name: &str,
        create_if_missing: bool,
    ) -> Result<std::sync::Arc<dyn FilterObject>, Error> {
        let dir = self.dir_for(name);
        let data_path = dir.join(DATA_FILE);

        let bits = if data_path.exists() {
            BitSet::load(&data_path).map_err(Error::internal)?
        } else if create_if_missing {
            let bit_len = filter_config
                .params
                .get("bits")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.config.default_bits);
            let hash_count = filter_config
                .params
                .get("hashes")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.config.default_hashes);
            BitSet::new(bit_len, hash_count)
        } else {
            return Err(Error::NotFound(name.to_string()));
        };

        std::fs::create_dir_all(&dir).map_err(Error::internal)?;
        let filter = FsFilter {
            name: name.to_string(),
            dir,
            state: Mutex::new(State::Mapped(bits)),
        };
        if !data_path.exists() {
            filter.persist_locked(&filter.state.lock().trace_expect("filter lock poisoned"))?;
        }
        Ok(std::sync::Arc::new(filter))
    }
}

struct FsFilter {
    name: String,
    dir: PathBuf,
    state: Mutex<State>,
}

enum State {
    Mapped(BitSet),
    Proxied,
}

impl FsFilter {
    fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    /// Ensures the in-memory bit array is present, reloading it from disk
    /// if this filter is currently proxied.
    fn remap_locked(&self, state: &mut State) -> Result<(), Error> {
        if matches!(state, State::Proxied) {
            let bits = BitSet::load(&self.data_path()).map_err(Error::internal)?;
            *state = State::Mapped(bits);
            tracing::debug!(filter = %self.name, "remapped from disk");
        }
        Ok(())
    }

    fn persist_locked(&self, state: &State) -> Result<(), Error> {
        let State::Mapped(bits) = state else {
            return Ok(());
        };
        bits.store(&self.data_path()).map_err(Error::internal)
    }
}

impl FilterObject for FsFilter {
    fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        let mut state = self.state.lock().trace_expect("filter lock poisoned");
        self.remap_locked(&mut state)?;
        let State::Mapped(bits) = &*state else {
            unreachable!("remap_locked guarantees Mapped")
        };
        Ok(bits.contains(key))
    }

    fn add(&self, key: &[u8]) -> Result<bool, Error> {
        let mut state = self.state.lock().trace_expect("filter lock poisoned");
        self.remap_locked(&mut state)?;
        let State::Mapped(bits) = &mut *state else {
            unreachable!("remap_locked guarantees Mapped")
        };
        Ok(bits.insert(key))
    }

    fn flush(&self) -> Result<(), Error> {
        let state = self.state.lock().trace_expect("filter lock poisoned");
        self.persist_locked(&state)
    }

    fn close(&self) -> Result<(), Error> {
        let mut state = self.state.lock().trace_expect("filter lock poisoned");
        self.persist_locked(&state)?;
        *state = State::Proxied;
        Ok(())
    }

    fn delete(&self) -> Result<(), Error> {
        let mut state = self.state.lock().trace_expect("filter lock poisoned");
        *state = State::Proxied;
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::internal(e)),
        }
    }

    fn is_proxied(&self) -> bool {
        matches!(
            &*self.state.lock().trace_expect("filter lock poisoned"),
            State::Proxied
        )
    }
}

/// A plain bit vector double-hashed with two salted FNV-1a passes
/// (Kirsch-Mitzenmacher: `h_i(x) = h1(x) + i*h2(x)`).
struct BitSet {
    bit_len: u64,
    hash_count: u32,
    bytes: Vec<u8>,
}

impl BitSet {
    fn new(bit_len: u64, hash_count: u32) -> Self {
        let byte_len = bit_len.div_ceil(8) as usize;
        Self {
            bit_len,
            hash_count,
            bytes: vec![0u8; byte_len],
        }
    }

    fn indices(&self, key: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let h1 = fnv1a(key, 0xcbf29ce484222325);
        let h2 = fnv1a(key, 0x9e3779b97f4a7c15);
        (0..self.hash_count).map(move |i| {
            let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
            (combined % self.bit_len) as usize
        })
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.indices(key).all(|idx| self.get(idx))
    }

    fn insert(&mut self, key: &[u8]) -> bool {
        let mut newly_set = false;
        for idx in self.indices(key).collect::<Vec<_>>() {
            if !self.get(idx) {
                newly_set = true;
            }
            self.set(idx);
        }
        newly_set
    }

    fn get(&self, bit: usize) -> bool {
        self.bytes[bit / 8] & (1 << (bit % 8)) != 0
    }

    fn set(&mut self, bit: usize) {
        self.bytes[bit / 8] |= 1 << (bit % 8);
    }

    fn load(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut header = [0u8; 16];
        file.read_exact(&mut header)?;
        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "bad filter file magic",
            ));
        }
        let hash_count = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let bit_len = u64::from_le_bytes(header[8..16].try_into().unwrap());
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(Self {
            bit_len,
            hash_count,
            bytes,
        })
    }

    /// Write-to-temp, fsync, rename-into-place — never a half-written
    /// filter file visible to a concurrent loader.
    fn store(&self, path: &Path) -> std::io::Result<()> {
        let dir = path.parent().expect("data path always has a parent dir");
        std::fs::create_dir_all(dir)?;
        let tmp_path = dir.join(format!(".{:x}.tmp", rand::rng().random::<u64>()));

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        direct_flag(&mut options);
        let mut file = options.open(&tmp_path)?;

        let write_result = (|| {
            file.write_all(&MAGIC.to_le_bytes())?;
            file.write_all(&self.hash_count.to_le_bytes())?;
            file.write_all(&self.bit_len.to_le_bytes())?;
            file.write_all(&self.bytes)?;
            file.sync_all()
        })();

        if write_result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
            return write_result;
        }
        std::fs::rename(&tmp_path, path)
    }
}

fn fnv1a(data: &[u8], seed: u64) -> u64 {
    let mut hash = seed;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
