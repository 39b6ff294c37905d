use anyhow::{bail, Context};

use sbd_kernel::console::{self, LogLevel};
use sbd_kernel::module::{load_module, unload_module};
use sbd_kernel::storage::request::{Completion, ReqOp, Request};
use sbd_kernel::storage::sim::{FaultPoint, SimBlockLayer};
use sbd_kernel::SbdModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmd {
    Geo,
    Write { sector: u64, count: u32, byte: u8 },
    Read { sector: u64, count: u32 },
    Nodes,
    Events,
}

fn number<T: std::str::FromStr>(s: &str, what: &str) -> anyhow::Result<T> {
    s.parse::<T>()
        .ok()
        .with_context(|| format!("{} inválido: {:?}", what, s))
}

fn byte(s: &str) -> anyhow::Result<u8> {
    match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16).with_context(|| format!("byte inválido: {:?}", s)),
        None => number(s, "byte"),
    }
}

fn parse_cmd(s: &str) -> anyhow::Result<Cmd> {
    let parts: Vec<&str> = s.split(':').collect();
    Ok(match parts.as_slice() {
        ["geo"] => Cmd::Geo,
        ["nodes"] => Cmd::Nodes,
        ["events"] => Cmd::Events,
        ["write", sector, count, b] => Cmd::Write {
            sector: number(sector, "setor")?,
            count: number(count, "contagem")?,
            byte: byte(b)?,
        },
        ["read", sector, count] => Cmd::Read {
            sector: number(sector, "setor")?,
            count: number(count, "contagem")?,
        },
        _ => bail!("comando desconhecido: {}", s),
    })
}

fn is_cmd(arg: &str) -> bool {
    let word = arg.split(':').next().unwrap_or_default();
    matches!(word, "geo" | "nodes" | "events" | "write" | "read")
}

/// Tamanho do buffer de um request; nunca maior que o disco inteiro.
fn transfer_len(count: u32, bs: u32, capacity: u64) -> anyhow::Result<usize> {
    let len = u64::from(count)
        .checked_mul(u64::from(bs))
        .context("tamanho do request estoura u64")?;
    if len > capacity {
        bail!("{} setores de {} bytes excedem o disco ({} bytes)", count, bs, capacity);
    }
    usize::try_from(len).context("tamanho do request estoura usize")
}

fn stderr_writer(level: LogLevel, line: &str) {
    eprintln!("[{:>6}] {}", level.tag(), line);
}

fn report(done: &Completion) {
    let req = &done.request;
    let what = if req.op == ReqOp::Write { "write" } else { "read" };
    let range = format!("{}..{}", req.sector, req.end_sector());
    if !done.status.is_ok() {
        println!("{} {}: {:?} ({})", what, range, done.status, done.status.to_errno());
        return;
    }
    if req.op == ReqOp::Write {
        println!("{} {}: Ok", what, range);
        return;
    }

    let buf = &req.buffer;
    let head: Vec<String> = buf.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    let uniform = buf.windows(2).all(|w| w[0] == w[1]);
    println!(
        "{} {}: {} bytes [{}{}]{}",
        what,
        range,
        buf.len(),
        head.join(" "),
        if buf.len() > 16 { " .." } else { "" },
        if uniform { " (uniform)" } else { "" }
    );
}

struct Session<'a> {
    module: &'a SbdModule,
    host: &'a SimBlockLayer,
    batch: Vec<Request>,
}

impl Session<'_> {
    /// Reads e writes consecutivos vão para a fila juntos e são despachados de uma vez.
    fn queue_io(&mut self, cmd: Cmd) -> anyhow::Result<()> {
        let name = self.module.disk_name();
        let bs = self.module.queue().logical_block_size();
        let capacity = self.host.capacity_bytes(name)?;
        let req = match cmd {
            Cmd::Write { sector, count, byte } => {
                Request::write(sector, count, vec![byte; transfer_len(count, bs, capacity)?])
            }
            Cmd::Read { sector, count } => {
                transfer_len(count, bs, capacity)?;
                Request::read(sector, count, bs)
            }
            _ => return Ok(()),
        };
        self.batch.push(req);
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let reqs = std::mem::take(&mut self.batch);
        let done = self
            .host
            .submit_batch(self.module.disk_name(), reqs)
            .context("submit falhou")?;
        done.iter().for_each(report);
        Ok(())
    }

    fn run(&mut self, cmd: Cmd) -> anyhow::Result<()> {
        if matches!(cmd, Cmd::Read { .. } | Cmd::Write { .. }) {
            return self.queue_io(cmd);
        }
        self.flush()?;

        let name = self.module.disk_name();
        match cmd {
            Cmd::Geo => {
                let geo = self.host.ioctl_getgeo(name).context("HDIO_GETGEO falhou")?;
                println!(
                    "{}: cylinders {} heads {} sectors {} start {}",
                    name, geo.cylinders, geo.heads, geo.sectors, geo.start
                );
            }
            Cmd::Nodes => {
                for node in self.host.nodes() {
                    let (major, minor) = self.host.disk(&node)?.devt();
                    println!("{} {}:{} {} bytes", node, major, minor, self.host.capacity_bytes(&node)?);
                }
            }
            Cmd::Events => {
                for ev in self.host.events() {
                    println!("{:?}", ev);
                }
            }
            Cmd::Read { .. } | Cmd::Write { .. } => {}
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let mut params = Vec::new();
    let mut fail_at = None;
    let mut cmds = Vec::new();

    for arg in std::env::args().skip(1) {
        if let Some(stage) = arg.strip_prefix("--fail-at=") {
            fail_at = Some(
                FaultPoint::parse(stage).with_context(|| format!("estágio desconhecido: {}", stage))?,
            );
        } else if let Some(level) = arg.strip_prefix("--loglevel=") {
            console::set_console_loglevel(number(level, "loglevel")?);
        } else if is_cmd(&arg) {
            cmds.push(parse_cmd(&arg)?);
        } else {
            params.push(arg);
        }
    }

    console::set_writer(stderr_writer);
    sbd_kernel::util::banner();

    let mut host = SimBlockLayer::new();
    if let Some(point) = fail_at {
        host.inject_fault(point);
    }

    let m = match load_module::<SbdModule>(&params.join(" "), &mut host) {
        Ok(m) => m,
        Err(errno) => {
            for ev in host.events() {
                println!("{:?}", ev);
            }
            bail!("insmod sbd falhou: errno {}", errno);
        }
    };

    let result = {
        let mut session = Session { module: &m, host: &host, batch: Vec::new() };
        let ran = cmds.into_iter().try_for_each(|cmd| session.run(cmd));
        ran.and_then(|_| session.flush())
    };
    unload_module(m, &mut host);
    result
}
