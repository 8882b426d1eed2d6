//! Lifecycle of the block store: ingest, load-from-disk, and LRU activation.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use memmap2::{Advice, Mmap};
use tracing::warn;

use crate::block::{Block, BlockId};
use crate::error::StoreError;
use crate::format::{write_f32_slice, ZetaHeader, HEADER_SIZE};

/// Construction-time configuration for a [`BlockStore`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory `.zeta` files are read from and written to.
    pub storage_dir: PathBuf,
    /// The dimension every block's summary/keys/values must share.
    pub summary_dim: usize,
    /// Maximum number of blocks the store will hold. Ingest past this
    /// limit fails with [`StoreError::Capacity`].
    pub max_blocks: usize,
    /// Maximum number of blocks resident (mmap'd and warm) at once.
    pub max_active_blocks: usize,
    /// When `false`, [`BlockStore::open`] does not scan `storage_dir` for
    /// pre-existing blocks (`no_load_existing_env` in `spec.md` §6).
    pub load_existing: bool,
}

/// Point-in-time counters for the orchestrator's statistics surface.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorageStats {
    /// Blocks currently registered with the store (resident or not).
    pub block_count: usize,
    /// Blocks currently in the active (resident) set.
    pub active_count: usize,
    /// Number of `activate` calls that found the block already warm.
    pub cache_hits: u64,
    /// Number of `activate` calls that required paging the block in.
    pub cache_misses: u64,
    /// Files skipped at load time for bad magic/version/dimension.
    pub skipped_files: u64,
    /// Blocks evicted from the active set.
    pub evictions: u64,
}

/// Owns a `Vec<Block>` (stable indices for the store's lifetime) and serves
/// them to the retrieval engine and prefetcher, who address blocks by
/// `block_index`, never by raw pointer, per `spec.md` §9.
pub struct BlockStore {
    config: StoreConfig,
    blocks: Vec<Block>,
    by_id: HashMap<BlockId, usize>,
    active_order: VecDeque<usize>,
    next_id: BlockId,
    generation: u64,
    stats: StorageStats,
}

impl BlockStore {
    /// Opens (creating if necessary) a store rooted at `config.storage_dir`.
    ///
    /// If `config.load_existing` is set, scans the directory for
    /// `block_*.zeta` files and registers each valid one; corrupt or
    /// version-mismatched files are skipped and logged, never quarantined.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.storage_dir)
            .map_err(|e| StoreError::io(&config.storage_dir, e))?;

        let mut store = Self {
            config,
            blocks: Vec::new(),
            by_id: HashMap::new(),
            active_order: VecDeque::new(),
            next_id: 0,
            generation: 0,
            stats: StorageStats::default(),
        };

        if store.config.load_existing {
            store.load_existing()?;
        }

        Ok(store)
    }

    /// Number of blocks currently registered.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// `true` if the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The block_id that the next `sublimate` call will assign.
    pub fn next_block_id(&self) -> BlockId {
        self.next_id
    }

    /// Looks up a block's stable index by id.
    pub fn index_of(&self, id: BlockId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// Borrows a block by stable index.
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Mutably borrows a block by stable index (used by the retrieval
    /// engine to update adjacency, and by the orchestrator to update
    /// `zeta_potential`/`last_access`).
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    /// Iterates over all registered blocks with their stable index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Block)> {
        self.blocks.iter().enumerate()
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> StorageStats {
        let mut stats = self.stats.clone();
        stats.block_count = self.blocks.len();
        stats.active_count = self.active_order.len();
        stats
    }

    /// Advances the store's internal step counter. The orchestrator calls
    /// this once per decode step so eviction can tell "activated this step"
    /// apart from "activated last step".
    pub fn advance_generation(&mut self) {
        self.generation += 1;
    }

    /// Packages `keys`/`values` (and an optional pre-computed `summary`,
    /// mean-pooled by the caller if absent — this crate does not compute
    /// summaries itself) into a new immutable block, written atomically to
    /// `storage_dir` and then mmap'd read-only.
    #[allow(clippy::too_many_arguments)]
    pub fn sublimate(
        &mut self,
        token_start: i64,
        token_count: i64,
        keys: &[f32],
        values: &[f32],
        summary: Vec<f32>,
    ) -> Result<BlockId, StoreError> {
        if self.blocks.len() >= self.config.max_blocks {
            return Err(StoreError::Capacity {
                limit: self.config.max_blocks,
            });
        }
        if summary.len() != self.config.summary_dim {
            return Err(StoreError::Dim {
                expected: self.config.summary_dim,
                got: summary.len(),
            });
        }

        let block_id = self.next_id;
        let header = ZetaHeader {
            block_id,
            token_start,
            token_count,
            summary_dim: self.config.summary_dim as i32,
        };

        let mut bytes = Vec::with_capacity(header.file_len());
        bytes.extend_from_slice(&header.to_bytes());
        write_f32_slice(&mut bytes, &summary);
        write_f32_slice(&mut bytes, keys);
        write_f32_slice(&mut bytes, values);

        let final_path = self.block_path(block_id);
        let tmp_path = self.block_path(block_id).with_extension("zeta.tmp");

        write_then_rename(&tmp_path, &final_path, &bytes)?;

        let file = OpenOptions::new()
            .read(true)
            .open(&final_path)
            .map_err(|e| StoreError::io(&final_path, e))?;
        let mmap = mmap_readonly(&file, &final_path)?;

        let mut block = Block::new(header, summary, Some(mmap));
        block.temporal_prev = self.blocks.last().map(Block::id);

        let index = self.blocks.len();
        self.by_id.insert(block_id, index);
        self.blocks.push(block);
        self.next_id += 1;

        Ok(block_id)
    }

    /// Makes the block at `index` resident, evicting the least-recently
    /// activated block if the active set is full.
    ///
    /// Never evicts a block activated in the current generation (the same
    /// decode step), per `spec.md` §4.3's invariant.
    pub fn activate(&mut self, index: usize) -> Result<(), StoreError> {
        let already_active = self
            .blocks
            .get(index)
            .map(|b| b.is_active)
            .unwrap_or(false);

        if already_active {
            self.stats.cache_hits += 1;
            if let Some(pos) = self.active_order.iter().position(|&i| i == index) {
                self.active_order.remove(pos);
            }
            self.active_order.push_back(index);
            if let Some(block) = self.blocks.get_mut(index) {
                block.activated_generation = self.generation;
            }
            return Ok(());
        }

        self.stats.cache_misses += 1;

        if self.active_order.len() >= self.config.max_active_blocks {
            self.evict_one();
        }

        let path = self
            .blocks
            .get(index)
            .map(|b| self.block_path(b.id()))
            .ok_or(StoreError::Dim {
                expected: 0,
                got: 0,
            })?;

        if let Some(block) = self.blocks.get_mut(index) {
            if block.mmap().is_none() {
                let file = OpenOptions::new()
                    .read(true)
                    .open(&path)
                    .map_err(|e| StoreError::io(&path, e))?;
                let mmap = mmap_readonly(&file, &path)?;
                block.set_mmap(Some(mmap));
            }
            block.is_active = true;
            block.activated_generation = self.generation;
        }

        self.active_order.push_back(index);
        Ok(())
    }

    /// Best-effort `MADV_WILLNEED` hint for a block not currently warm:
    /// opens and mmaps the block's file if needed, advises the kernel, and
    /// marks it warm. Does not add the block to the active set — a
    /// prefetch hint is advisory only and a later eviction may page the
    /// data back out before [`BlockStore::activate`] is ever called on it.
    /// Hint failures are silent, per `spec.md` §4.5.
    pub fn hint_warm(&mut self, index: usize) -> Result<(), StoreError> {
        let already_warm = self.blocks.get(index).map(|b| b.is_warm).unwrap_or(true);
        if already_warm {
            return Ok(());
        }

        let path = self
            .blocks
            .get(index)
            .map(|b| self.block_path(b.id()))
            .ok_or(StoreError::Dim { expected: 0, got: 0 })?;

        if let Some(block) = self.blocks.get_mut(index) {
            if block.mmap().is_none() {
                let file = OpenOptions::new()
                    .read(true)
                    .open(&path)
                    .map_err(|e| StoreError::io(&path, e))?;
                let mmap = mmap_readonly(&file, &path)?;
                block.set_mmap(Some(mmap));
            }
            if let Some(mmap) = block.mmap() {
                let _ = mmap.advise(Advice::WillNeed);
            }
            block.is_warm = true;
        }
        Ok(())
    }

    fn evict_one(&mut self) {
        let mut victim_slot = None;
        for (pos, &candidate) in self.active_order.iter().enumerate() {
            let protected = self
                .blocks
                .get(candidate)
                .map(|b| b.activated_generation == self.generation)
                .unwrap_or(true);
            if !protected {
                victim_slot = Some(pos);
                break;
            }
        }

        let Some(pos) = victim_slot else {
            // Every resident block was activated this very step; nothing is
            // safe to evict without violating the same-step guarantee, so
            // the active set is allowed to transiently exceed its limit.
            return;
        };

        let victim = self.active_order.remove(pos).unwrap_or(usize::MAX);
        if let Some(block) = self.blocks.get_mut(victim) {
            if let Some(mmap) = block.mmap() {
                let _ = mmap.advise(Advice::DontNeed);
            }
            block.is_active = false;
            block.set_mmap(None);
        }
        self.stats.evictions += 1;
    }

    fn block_path(&self, id: BlockId) -> PathBuf {
        self.config.storage_dir.join(format!("block_{id}.zeta"))
    }

    fn load_existing(&mut self) -> Result<(), StoreError> {
        let entries =
            fs::read_dir(&self.config.storage_dir).map_err(|e| StoreError::io(&self.config.storage_dir, e))?;

        let mut loaded: Vec<(BlockId, ZetaHeader, Vec<f32>, PathBuf)> = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            let is_zeta = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("block_") && n.ends_with(".zeta"))
                .unwrap_or(false);
            if !is_zeta {
                continue;
            }

            match self.read_block_file(&path) {
                Ok((header, summary)) => {
                    if header.summary_dim as usize != self.config.summary_dim {
                        warn!(
                            path = %path.display(),
                            expected = self.config.summary_dim,
                            got = header.summary_dim,
                            "skipping .zeta file with mismatched summary_dim"
                        );
                        self.stats.skipped_files += 1;
                        continue;
                    }
                    loaded.push((header.block_id, header, summary, path));
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping corrupt .zeta file");
                    self.stats.skipped_files += 1;
                }
            }
        }

        loaded.sort_by_key(|(id, _, _, _)| *id);

        let mut prev_id: Option<BlockId> = None;
        for (block_id, header, summary, path) in loaded {
            let file = OpenOptions::new()
                .read(true)
                .open(&path)
                .map_err(|e| StoreError::io(&path, e))?;
            let mmap = mmap_readonly(&file, &path)?;

            let mut block = Block::new(header, summary, Some(mmap));
            block.temporal_prev = prev_id;

            let index = self.blocks.len();
            self.by_id.insert(block_id, index);
            self.blocks.push(block);
            prev_id = Some(block_id);
        }

        self.next_id = self.blocks.iter().map(Block::id).max().map_or(0, |m| m + 1);

        Ok(())
    }

    fn read_block_file(&self, path: &Path) -> Result<(ZetaHeader, Vec<f32>), crate::format::FormatError> {
        let bytes = fs::read(path).map_err(|_| crate::format::FormatError::Truncated(0))?;
        let header = ZetaHeader::from_bytes(&bytes)?;
        let summary_start = HEADER_SIZE;
        let summary_len = header.summary_dim as usize;
        if bytes.len() < summary_start + summary_len * 4 {
            return Err(crate::format::FormatError::Truncated(bytes.len()));
        }
        let summary = crate::format::read_f32_slice(&bytes, summary_start, summary_len);
        Ok((header, summary))
    }
}

fn write_then_rename(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(tmp_path).map_err(|e| StoreError::io(tmp_path, e))?;
    file.write_all(bytes).map_err(|e| StoreError::io(tmp_path, e))?;
    file.sync_all().map_err(|e| StoreError::io(tmp_path, e))?;
    fs::rename(tmp_path, final_path).map_err(|e| StoreError::io(final_path, e))?;
    Ok(())
}

fn mmap_readonly(file: &File, path: &Path) -> Result<Mmap, StoreError> {
    // Safety: the file is never mutated again after `sublimate`/load — a
    // block's payload is immutable for the lifetime of the process per
    // `spec.md` §3. Another process truncating or rewriting the file out
    // from under us is the one case this mapping cannot protect against;
    // that is the documented tradeoff of `.zeta`'s append-only,
    // externally-removable lifecycle.
    unsafe { Mmap::map(file) }.map_err(|e| StoreError::io(path, e))
}
