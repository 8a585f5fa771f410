use super::config::{CliConfig, Command};
use std::{
    fs::File,
    io::{self, ErrorKind, Read},
    path::{Path, PathBuf},
    sync::Arc,
};
use taskfan::{
    ConcurrencyOption, ConcurrencyResolver, ConcurrentTasks, EnvSource, Worker, WorkerQueueThreads,
};

/// Read buffer for each counting thread.
const COUNT_BUFFER_SIZE: usize = 64 * 1024;

/// Runs the selected subcommand.
pub async fn run(config: CliConfig) -> anyhow::Result<()> {
    // One resolver per process, so the deprecation notice is logged once.
    let resolver = Arc::new(ConcurrencyResolver::new());

    match config.command {
        Command::Concurrency => {
            let concurrency = resolver.resolve(config.concurrency)?;
            println!("{concurrency}");
        }
        Command::Count { paths } => {
            let counts = count(paths, config.concurrency, resolver).await?;
            print_counts(&counts);
        }
        Command::Stat { paths } => {
            stat(
                paths,
                config.concurrency,
                config.concurrency_factor,
                resolver.as_ref(),
            )
            .await?;
        }
    }
    Ok(())
}

/// Line and byte totals for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCount {
    pub path: PathBuf,
    pub lines: u64,
    pub bytes: u64,
}

/// Counts newlines and bytes with a reusable per-thread buffer.
pub struct LineCounter {
    buf: Vec<u8>,
}

impl Worker for LineCounter {
    type Context = usize;
    type Item = PathBuf;
    type Output = FileCount;
    type Error = io::Error;

    fn start(buffer_size: usize) -> io::Result<Self> {
        if buffer_size == 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "count buffer must not be empty",
            ));
        }
        Ok(Self {
            buf: vec![0; buffer_size],
        })
    }

    fn process(&mut self, path: PathBuf) -> io::Result<FileCount> {
        let mut file = File::open(&path).map_err(|e| with_path(&path, e))?;
        let mut count = FileCount {
            path,
            lines: 0,
            bytes: 0,
        };

        loop {
            let n = match file.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(with_path(&count.path, e)),
            };
            count.bytes += n as u64;
            count.lines += self.buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        }

        Ok(count)
    }
}

fn with_path(path: &Path, e: io::Error) -> io::Error {
    io::Error::new(e.kind(), format!("{}: {e}", path.display()))
}

/// Counts every file on worker threads. Results are in input order.
async fn count(
    paths: Vec<PathBuf>,
    concurrency: Option<ConcurrencyOption>,
    resolver: Arc<ConcurrencyResolver>,
) -> anyhow::Result<Vec<FileCount>> {
    // The thread runner blocks until every thread has exited.
    let counts = tokio::task::spawn_blocking(move || {
        WorkerQueueThreads::<LineCounter>::new(paths, COUNT_BUFFER_SIZE)
            .with_concurrency(concurrency)
            .run(resolver.as_ref())
    })
    .await??;
    Ok(counts)
}

fn print_counts(counts: &[FileCount]) {
    for count in counts {
        println!(
            "{:>10} {:>12} {}",
            count.lines,
            count.bytes,
            count.path.display()
        );
    }
    if counts.len() > 1 {
        let lines: u64 = counts.iter().map(|c| c.lines).sum();
        let bytes: u64 = counts.iter().map(|c| c.bytes).sum();
        println!("{lines:>10} {bytes:>12} total");
    }
}

/// Prints kind and size of every path as its metadata arrives.
async fn stat<E: EnvSource>(
    paths: Vec<PathBuf>,
    concurrency: Option<ConcurrencyOption>,
    concurrency_factor: f64,
    resolver: &ConcurrencyResolver<E>,
) -> anyhow::Result<()> {
    let tasks = ConcurrentTasks::new(paths, |path: PathBuf| async move {
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| with_path(&path, e))?;
        let kind = if metadata.is_dir() { "dir" } else { "file" };
        println!("{kind:<4} {:>12} {}", metadata.len(), path.display());
        Ok::<_, io::Error>(())
    })
    .with_concurrency_factor(concurrency_factor)
    .with_concurrency(concurrency);

    tracing::debug!("Reading metadata on {} lanes", tasks.lane_count(resolver)?);
    tasks.run(resolver).await?;
    Ok(())
}
