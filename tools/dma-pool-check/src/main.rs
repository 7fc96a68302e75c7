//! DMA pool soak check
//!
//! Creates a batch of pools with assorted geometries, drains each one,
//! scribbles patterns into a few buffers, verifies bus ↔ virtual translation
//! for every buffer, then frees everything in reverse and destroys the pools.
//!
//! Usage:
//!   dma-pool-check                 # hugetlb + /proc/self/pagemap (root)
//!   dma-pool-check --heap          # heap memory, identity translation

mod logger;

use clap::{Parser, ValueEnum};
use dma_pool::{
    CreateError, DmaBuffer, DmaContext, DmaDevice, DmaPool, FreeListError, HugePageBackend,
    PhysResolver, PoolConfig, VirtualAddress,
};
use log::{LevelFilter, error, info, warn};
use std::process::ExitCode;

use crate::logger::StderrLogger;

/// `(buffer_count, buffer_size)` of every pool in a round.
const POOLS: [(usize, u64); 20] = [
    (1, 1_074_240),
    (3200, 16384),
    (512, 8192),
    (511, 32768),
    (63, 4096),
    (7, 4096),
    (7, 8192),
    (96, 8192),
    (0, 64),
    (15, 16384),
    (15, 4096),
    (3, 32768),
    (15, 1024),
    (127, 1024),
    (7, 1024),
    (5, 1024),
    (5, 4096),
    (63, 8192),
    (63, 8192),
    (1, 8),
];

/// `(pool, buffer)` positions that get a pattern written and read back.
const PATTERNED: [(usize, usize); 2] = [(2, 3), (12, 0)];

#[derive(Parser, Debug)]
#[command(name = "dma-pool-check")]
#[command(about = "Exercise hugepage-backed DMA pools end to end")]
struct Args {
    /// Use heap memory with identity translation instead of hugetlb
    #[arg(long)]
    heap: bool,

    /// Buffer alignment for every pool
    #[arg(long, default_value_t = 256)]
    alignment: u64,

    /// Verify translation every this many bytes of each buffer
    #[arg(long, default_value_t = 1)]
    stride: u64,

    /// How often to repeat the whole batch
    #[arg(long, default_value_t = 1)]
    rounds: usize,

    /// Device id the pools are created for
    #[arg(long, default_value_t = 0)]
    device: u32,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CheckError {
    #[error("creating pool {pool}: {source}")]
    Create {
        pool: String,
        #[source]
        source: CreateError,
    },
    #[error("pool {pool}: buffer {index}: {source}")]
    Buffer {
        pool: String,
        index: usize,
        #[source]
        source: FreeListError,
    },
    #[error("pool {pool}: {what}")]
    Mismatch { pool: String, what: String },
}

fn main() -> ExitCode {
    let args = Args::parse();
    if StderrLogger::new(args.log_level.into()).init().is_err() {
        eprintln!("logger already installed");
    }

    let outcome = if args.heap {
        run(&DmaContext::heap(), &args)
    } else {
        run(&DmaContext::new(), &args)
    };

    match outcome {
        Ok(()) => {
            info!("all checks passed");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run<B: HugePageBackend, R: PhysResolver>(
    ctx: &DmaContext<B, R>,
    args: &Args,
) -> Result<(), CheckError> {
    let device = DmaDevice::new(args.device, 0);
    for round in 0..args.rounds {
        info!("round {}/{}", round + 1, args.rounds);

        let mut pools = Vec::with_capacity(POOLS.len());
        for (i, &(count, size)) in POOLS.iter().enumerate() {
            let name = format!("pool-{i}");
            let config = PoolConfig::new(&name, size, count)
                .with_device(device)
                .with_alignment(args.alignment);
            match ctx.create_pool(&config) {
                Ok(pool) => pools.push(Some(pool)),
                Err(CreateError::ZeroBuffers) if count == 0 => {
                    warn!("{name}: empty pool rejected as expected");
                    pools.push(None);
                }
                Err(source) => return Err(CheckError::Create { pool: name, source }),
            }
        }

        let mut buffers = Vec::with_capacity(pools.len());
        for pool in &pools {
            buffers.push(match pool {
                Some(pool) => drain(pool)?,
                None => Vec::new(),
            });
        }

        for &(p, b) in &PATTERNED {
            if let (Some(pool), Some(buf)) = (&pools[p], buffers[p].get(b)) {
                check_pattern(pool, buf)?;
            }
        }

        for (pool, bufs) in pools.iter().zip(&buffers) {
            if let Some(pool) = pool {
                check_translation(pool, bufs, args.stride.max(1))?;
            }
        }

        for (pool, bufs) in pools.iter().zip(&buffers).rev() {
            if let Some(pool) = pool {
                release(pool, bufs)?;
            }
        }

        for pool in pools.into_iter().rev().flatten() {
            pool.destroy();
        }
    }
    Ok(())
}

fn drain<B: HugePageBackend>(pool: &DmaPool<B>) -> Result<Vec<DmaBuffer>, CheckError> {
    let mut bufs = Vec::with_capacity(pool.buffer_count());
    for index in 0..pool.buffer_count() {
        let buf = pool.allocate().map_err(|source| CheckError::Buffer {
            pool: pool.name().to_owned(),
            index,
            source,
        })?;
        bufs.push(buf);
    }
    if pool.allocate().is_ok() {
        return Err(mismatch(pool, "allocated past the buffer count"));
    }
    Ok(bufs)
}

#[allow(clippy::cast_possible_truncation)]
fn check_pattern<B: HugePageBackend>(pool: &DmaPool<B>, buf: &DmaBuffer) -> Result<(), CheckError> {
    // SAFETY: the pool is alive and the buffer is allocated and unshared.
    let bytes = unsafe { buf.as_mut_slice() };
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (i as u8) ^ 0x5A;
    }
    if let Some(i) = bytes.iter().enumerate().position(|(i, &b)| b != (i as u8) ^ 0x5A) {
        return Err(mismatch(pool, &format!("pattern broken at {:?}+{i}", buf.virt())));
    }
    info!("{}: pattern ok in {:?}", pool.name(), buf.virt());
    Ok(())
}

fn check_translation<B: HugePageBackend>(
    pool: &DmaPool<B>,
    bufs: &[DmaBuffer],
    stride: u64,
) -> Result<(), CheckError> {
    for buf in bufs {
        for off in (0..buf.size()).step_by(usize::try_from(stride).unwrap_or(usize::MAX)) {
            let va: VirtualAddress = buf.virt() + off;
            let bus = pool
                .resolve_physical(va)
                .ok_or_else(|| mismatch(pool, &format!("{va:?} has no bus address")))?;
            if pool.resolve_virtual(bus) != Some(va) {
                return Err(mismatch(pool, &format!("{bus:?} does not map back to {va:?}")));
            }
        }
    }
    info!("{}: {} buffer(s) translate both ways", pool.name(), bufs.len());
    Ok(())
}

fn release<B: HugePageBackend>(pool: &DmaPool<B>, bufs: &[DmaBuffer]) -> Result<(), CheckError> {
    for (index, buf) in bufs.iter().enumerate().rev() {
        pool.free(buf.virt()).map_err(|source| CheckError::Buffer {
            pool: pool.name().to_owned(),
            index,
            source,
        })?;
    }
    if pool.available() != pool.buffer_count() {
        return Err(mismatch(pool, "buffers missing after release"));
    }
    Ok(())
}

fn mismatch<B: HugePageBackend>(pool: &DmaPool<B>, what: &str) -> CheckError {
    CheckError::Mismatch {
        pool: pool.name().to_owned(),
        what: what.to_owned(),
    }
}
