//! Thin driver around the debugger core: launch or attach, then read
//! commands from stdin until the user quits.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use nix::unistd::Pid;
use tracing::{debug, error};

use burrow::addr::VirtAddr;
use burrow::process::{ProcessState, StopReason, TrapType};
use burrow::target::Target;

/// Launch the burrow debugger
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The program to launch as inferior
    #[clap(required_unless_present = "pid")]
    program: Option<PathBuf>,

    /// Arguments passed to the inferior
    #[clap(trailing_var_arg = true)]
    args: Vec<String>,

    /// Attach to a running process instead of launching one
    #[clap(short, long, conflicts_with = "program")]
    pid: Option<i32>,
}

fn main() -> ExitCode {
    setup_logger();
    let args = Args::parse();

    let target = match open_target(&args) {
        Ok(target) => target,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(1);
        }
    };
    debug!("inferior pid: {}", target.process().pid());

    match command_loop(target) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

fn open_target(args: &Args) -> burrow::Result<Target> {
    match (args.pid, &args.program) {
        (Some(pid), _) => Target::attach(Pid::from_raw(pid)),
        (None, Some(program)) => Target::launch(program, &args.args, None),
        (None, None) => unreachable!("clap enforces program or pid"),
    }
}

fn command_loop(mut target: Target) -> burrow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("burrow> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let rest: Vec<&str> = words.collect();

        let result = match command {
            "q" | "quit" => break,
            "c" | "continue" => resume(&mut target),
            "s" | "step" => step(&mut target),
            "b" | "break" => set_breakpoint(&mut target, &rest),
            "d" | "delete" => delete_breakpoint(&mut target, &rest),
            other => {
                println!("unknown command: {other} (try break/continue/step/delete/quit)");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("{e}");
        }
    }

    Ok(())
}

fn resume(target: &mut Target) -> burrow::Result<()> {
    target.process_mut().resume()?;
    let reason = target.process_mut().wait_on_signal()?;
    report_stop(target, &reason)
}

fn step(target: &mut Target) -> burrow::Result<()> {
    let reason = target.process_mut().step_instruction()?;
    report_stop(target, &reason)
}

fn set_breakpoint(target: &mut Target, args: &[&str]) -> burrow::Result<()> {
    let Some(location) = args.first() else {
        println!("usage: break <function | file:line | 0xaddress>");
        return Ok(());
    };

    let id = if let Some(hex) = location.strip_prefix("0x") {
        let Ok(addr) = u64::from_str_radix(hex, 16) else {
            println!("bad address: {location}");
            return Ok(());
        };
        target.create_address_breakpoint(VirtAddr::new(addr), false, false)?
    } else if let Some((file, line)) = location
        .rsplit_once(':')
        .and_then(|(file, line)| line.parse::<u64>().ok().map(|line| (file, line)))
    {
        target.create_line_breakpoint(file, line, false, false)?
    } else {
        target.create_function_breakpoint(*location, false, false)?
    };

    target.enable_breakpoint(id)?;
    let sites = target.get_breakpoint(id)?.site_ids().len();
    println!("breakpoint {id} set ({sites} site(s))");
    Ok(())
}

fn delete_breakpoint(target: &mut Target, args: &[&str]) -> burrow::Result<()> {
    let Some(id) = args.first().and_then(|a| a.parse().ok()) else {
        println!("usage: delete <breakpoint id>");
        return Ok(());
    };
    target.remove_breakpoint(id)?;
    println!("breakpoint {id} removed");
    Ok(())
}

fn report_stop(target: &Target, reason: &StopReason) -> burrow::Result<()> {
    match reason.state {
        ProcessState::Exited => println!("inferior exited with code {}", reason.info),
        ProcessState::Terminated => println!("inferior terminated by signal {}", reason.info),
        ProcessState::Running => {}
        ProcessState::Stopped => {
            let pc = target.process().pc();
            let location = target
                .function_at(pc)?
                .and_then(|f| f.name)
                .map(|name| format!(" in {name}"))
                .unwrap_or_default();

            match reason.trap {
                Some(TrapType::SoftwareBreak) | Some(TrapType::HardwareBreak) => {
                    println!("stopped at breakpoint, pc = {pc}{location}");
                }
                Some(TrapType::SingleStep) => println!("stepped to {pc}{location}"),
                Some(TrapType::Syscall) => {
                    println!("syscall stop at {pc}: {:?}", reason.syscall)
                }
                _ => println!("stopped by signal {} at {pc}{location}", reason.info),
            }
        }
    }
    Ok(())
}

fn setup_logger() {
    // construct a subscriber that prints formatted traces to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(io::stderr)
        .without_time()
        .finish();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber).expect("could not setup logger");
}
