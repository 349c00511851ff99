//! Probe-attached CLI for inspecting FreeRTOS tasks.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use probe_rs::probe::list::Lister;
use probe_rs::{Core, Permissions};
use std::path::PathBuf;
use std::time::Duration;
use taskscope_core::{build_snapshot, Snapshot, TargetMap, TaskBreakpoint, TaskTable};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target chip name, e.g. STM32F407VGTx
    #[arg(short, long)]
    chip: String,

    /// Firmware ELF the target is running, with symbols
    #[arg(short, long)]
    elf: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display every task the kernel knows about
    Tasks {
        /// Emit the table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run until the named task stops at a location
    Break {
        /// Task whose stops should be reported
        task: String,
        /// Breakpoint location: hex address or function symbol
        location: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let map = TargetMap::from_elf(&cli.elf)
        .with_context(|| format!("failed to load {}", cli.elf.display()))?;
    if !map.has_scheduler_symbols() {
        log::warn!("image has no kernel scheduler symbols, is this the right ELF?");
    }

    let lister = Lister::new();
    let probe = lister
        .list_all()
        .into_iter()
        .next()
        .context("no debug probe found")?
        .open()
        .context("failed to open probe")?;
    let mut session = probe
        .attach(cli.chip.as_str(), Permissions::default())
        .context("failed to attach to target")?;
    let mut core = session.core(0).context("failed to attach core")?;

    match cli.command {
        Commands::Tasks { json } => show_tasks(&mut core, &map, json),
        Commands::Break { task, location } => watch_task(&mut core, &map, &task, &location),
    }
}

fn show_tasks(core: &mut Core, map: &TargetMap, json: bool) -> Result<()> {
    // Halt for a consistent read, but put the target back how we found it.
    let was_running = !core.core_halted()?;
    if was_running {
        core.halt(Duration::from_millis(100)).context("failed to halt core")?;
    }
    let snapshot = build_snapshot(&mut *core, map);
    if was_running {
        core.run().context("failed to resume core")?;
    }

    match snapshot? {
        Snapshot::SchedulerNotStarted => {
            println!(
                "There are currently no tasks. The program may not have created any tasks yet."
            );
        }
        Snapshot::Tasks(table) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                print!("{}", render(&table));
            }
        }
    }
    Ok(())
}

fn watch_task(core: &mut Core, map: &TargetMap, task: &str, location: &str) -> Result<()> {
    let address = resolve_location(map, location)?;
    let breakpoint = TaskBreakpoint::new(task, address);

    core.set_hw_breakpoint(address).context("failed to set breakpoint")?;
    println!("watching {address:#010x} for task \"{task}\", ctrl-c to give up");

    let outcome = wait_for_task(core, map, &breakpoint);
    // Leave the target clean even when the wait failed.
    let _ = core.clear_hw_breakpoint(address);

    let pc = outcome?;
    println!("task \"{task}\" stopped at {pc:#010x}");
    Ok(())
}

fn wait_for_task(core: &mut Core, map: &TargetMap, breakpoint: &TaskBreakpoint) -> Result<u64> {
    loop {
        core.run().context("failed to resume core")?;
        loop {
            match core.wait_for_core_halted(Duration::from_millis(500)) {
                Ok(()) => break,
                Err(probe_rs::Error::Timeout) => {}
                Err(e) => return Err(e).context("lost the target while waiting for a stop"),
            }
        }
        if breakpoint.should_stop(&mut *core, map) {
            let pc: u64 = core.read_core_reg(core.program_counter())?;
            return Ok(pc);
        }
        log::debug!("stop did not belong to \"{}\", resuming", breakpoint.task_name());
    }
}

fn resolve_location(map: &TargetMap, location: &str) -> Result<u64> {
    if let Some(hex) = location.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16)
            .with_context(|| format!("`{location}` is not a valid hex address"));
    }
    if let Some(sym) = map.symbol(location) {
        return Ok(sym.address);
    }
    bail!("location `{location}` is neither a hex address nor a known symbol")
}

fn render(table: &TaskTable) -> String {
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut cells = vec![
            format!("{:#010x}", row.handle),
            row.state.to_string(),
            row.core.map(|c| c.to_string()).unwrap_or_default(),
        ];
        cells.extend(row.values.iter().map(ToString::to_string));
        rows.push(cells);
    }

    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let headers: Vec<String> = table.headers.iter().map(ToString::to_string).collect();
    let rules: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut out = String::new();
    for cells in std::iter::once(&headers).chain(std::iter::once(&rules)).chain(rows.iter()) {
        out.push_str(pad_line(cells, &widths).trim_end());
        out.push('\n');
    }
    out
}

fn pad_line(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}", width = *width))
        .collect::<Vec<_>>()
        .join("  ")
}
