//! End to end tests of the process controller, run against stock system
//! binaries so no fixture compilation is needed.

use std::io::Read;
use std::process::{Command, Stdio};

use nix::libc;
use nix::unistd::Pid;
use syscalls::Sysno;

use burrow::addr::VirtAddr;
use burrow::errors::DebuggerError;
use burrow::process::{
    process_exists, HardwareStoppoint, Process, ProcessState, SyscallCatchPolicy, TrapType,
};
use burrow::register_info::RegisterId;
use burrow::stoppoint::{Stoppoint, StoppointMode};

const NO_ARGS: &[String] = &[];

fn launch(path: &str) -> Process {
    Process::launch(path, NO_ARGS, true, None).expect("launch failed")
}

fn entry_point(proc: &Process) -> VirtAddr {
    let auxv = proc.get_auxv().expect("auxv readable");
    VirtAddr::new(auxv[&libc::AT_ENTRY])
}

#[test]
fn launch_success() {
    let pid;
    {
        let proc = launch("yes");
        pid = proc.pid();
        assert!(process_exists(pid));
        assert_eq!(proc.state(), ProcessState::Stopped);
    }
    // the owned inferior is killed and reaped on drop
    assert!(!process_exists(pid));
}

#[test]
fn launch_without_debug() {
    let proc = Process::launch("yes", NO_ARGS, false, None).expect("launch failed");
    assert_eq!(proc.state(), ProcessState::Running);
    assert!(!proc.is_attached());
    assert!(process_exists(proc.pid()));
}

#[test]
fn launch_no_such_program() {
    let result = Process::launch("you_do_not_have_to_be_good", NO_ARGS, true, None);
    assert!(matches!(result, Err(DebuggerError::LaunchFailed(_))));
}

#[test]
fn launch_no_such_path() {
    // a path with a separator takes the same fork-and-pipe error route as
    // a bare program name
    let result = Process::launch("/bin/you_do_not_have_to_be_good", NO_ARGS, true, None);
    assert!(matches!(result, Err(DebuggerError::LaunchFailed(_))));

    let result = Process::launch("./you_do_not_have_to_be_good", NO_ARGS, true, None);
    assert!(matches!(result, Err(DebuggerError::LaunchFailed(_))));
}

#[test]
fn attach_success() {
    let mut child = Command::new("yes")
        .stdout(Stdio::null())
        .spawn()
        .expect("spawn");
    {
        let proc = Process::attach(Pid::from_raw(child.id() as i32)).expect("attach failed");
        assert_eq!(proc.state(), ProcessState::Stopped);
        assert!(proc.is_attached());
    }
    // dropping detached, the child lives on
    assert!(process_exists(Pid::from_raw(child.id() as i32)));
    child.kill().unwrap();
    child.wait().unwrap();
}

#[test]
fn attach_invalid_pid() {
    assert!(matches!(
        Process::attach(Pid::from_raw(0)),
        Err(DebuggerError::AttachFailed(_, _))
    ));
}

#[test]
fn resume_until_exit() {
    let mut proc = launch("true");
    proc.resume().expect("resume");
    assert_eq!(proc.state(), ProcessState::Running);

    let reason = proc.wait_on_signal().expect("wait");
    assert_eq!(reason.state, ProcessState::Exited);
    assert_eq!(reason.info, 0);
    assert_eq!(proc.state(), ProcessState::Exited);
}

#[test]
fn stdout_replacement_reaches_pipe() {
    let (read_fd, write_fd) = nix::unistd::pipe().expect("pipe");

    let mut proc = Process::launch("echo", &["hello".to_string()], true, Some(write_fd))
        .expect("launch failed");
    proc.resume().expect("resume");
    while proc.wait_on_signal().expect("wait").state != ProcessState::Exited {
        proc.resume().expect("resume");
    }

    let mut output = String::new();
    std::fs::File::from(read_fd)
        .read_to_string(&mut output)
        .expect("read pipe");
    assert_eq!(output, "hello\n");
}

#[test]
fn register_read_and_write() {
    let mut proc = launch("yes");

    let rip: u64 = proc.registers().read_by_id_as(RegisterId::Rip).unwrap();
    assert_ne!(rip, 0, "registers refreshed on the exec stop");

    proc.registers_mut()
        .write_by_id(RegisterId::R13, 0x2a2a2a2au64)
        .unwrap();
    let r13: u64 = proc.registers().read_by_id_as(RegisterId::R13).unwrap();
    assert_eq!(r13, 0x2a2a2a2a);
}

#[test]
fn register_type_mismatch() {
    let proc = launch("yes");
    let result = proc.registers().read_by_id_as::<u32>(RegisterId::Rip);
    assert!(matches!(
        result,
        Err(DebuggerError::RegisterTypeMismatch { .. })
    ));
}

#[test]
fn software_breakpoint_hit_and_restore() {
    let mut proc = launch("true");
    let entry = entry_point(&proc);

    let site_id = proc
        .create_breakpoint_site(entry, false, false)
        .expect("create site")
        .id();
    proc.enable_breakpoint_site(site_id).unwrap();

    // the patch is visible through the plain read and hidden by the
    // trap-free read
    let original = proc.read_memory_without_traps(entry, 1).unwrap()[0];
    assert_eq!(proc.read_memory(entry, 1).unwrap()[0], 0xcc);
    assert_ne!(original, 0xcc);

    // enabling again is a no-op
    proc.enable_breakpoint_site(site_id).unwrap();
    assert_eq!(
        proc.read_memory_without_traps(entry, 1).unwrap()[0],
        original
    );

    proc.resume().expect("resume");
    let reason = proc.wait_on_signal().expect("wait");
    assert_eq!(reason.state, ProcessState::Stopped);
    assert_eq!(reason.trap, Some(TrapType::SoftwareBreak));
    assert_eq!(proc.pc(), entry);

    // disabling restores the original byte, twice is a no-op
    proc.disable_breakpoint_site(site_id).unwrap();
    proc.disable_breakpoint_site(site_id).unwrap();
    assert_eq!(proc.read_memory(entry, 1).unwrap()[0], original);

    proc.resume().expect("resume");
    let reason = proc.wait_on_signal().expect("wait");
    assert_eq!(reason.state, ProcessState::Exited);
}

#[test]
fn resume_steps_over_active_breakpoint() {
    let mut proc = launch("true");
    let entry = entry_point(&proc);

    let site_id = proc
        .create_breakpoint_site(entry, false, false)
        .unwrap()
        .id();
    proc.enable_breakpoint_site(site_id).unwrap();

    proc.resume().unwrap();
    let reason = proc.wait_on_signal().unwrap();
    assert_eq!(reason.trap, Some(TrapType::SoftwareBreak));

    // resuming with the site still enabled must not re-trap at the same pc
    proc.resume().unwrap();
    let reason = proc.wait_on_signal().unwrap();
    assert_eq!(reason.state, ProcessState::Exited);
}

#[test]
fn step_instruction_reports_single_step() {
    let mut proc = launch("true");
    let before = proc.pc();

    let reason = proc.step_instruction().expect("step");
    assert_eq!(reason.state, ProcessState::Stopped);
    assert_eq!(reason.trap, Some(TrapType::SingleStep));
    assert_ne!(proc.pc(), before);
}

#[test]
fn duplicate_site_address_rejected() {
    let mut proc = launch("true");
    let entry = entry_point(&proc);

    proc.create_breakpoint_site(entry, false, false).unwrap();
    assert!(matches!(
        proc.create_breakpoint_site(entry, false, false),
        Err(DebuggerError::DuplicateAddress(_))
    ));
}

#[test]
fn write_memory_round_trip() {
    let mut proc = launch("true");
    let rsp: u64 = proc.registers().read_by_id_as(RegisterId::Rsp).unwrap();
    let scratch = VirtAddr::new(rsp - 512);

    // seven bytes exercises the read-modify-write tail
    proc.write_memory(scratch, b"burrow!").unwrap();
    assert_eq!(proc.read_memory(scratch, 7).unwrap(), b"burrow!");
}

#[test]
fn hardware_slot_allocation_and_exhaustion() {
    let mut proc = launch("true");

    let mut ids = Vec::new();
    for i in 0..4u64 {
        let id = proc
            .create_breakpoint_site(VirtAddr::new(0x1000 + i * 0x1000), true, false)
            .unwrap()
            .id();
        proc.enable_breakpoint_site(id).unwrap();
        ids.push(id);
    }

    // DR7 occupancy matches the enabled site count
    let dr7: u64 = proc.registers().read_by_id_as(RegisterId::Dr(7)).unwrap();
    let local_enables = (0..4).filter(|i| dr7 & (1 << (i * 2)) != 0).count();
    assert_eq!(local_enables, 4);

    let fifth = proc
        .create_breakpoint_site(VirtAddr::new(0x9000), true, false)
        .unwrap()
        .id();
    assert!(matches!(
        proc.enable_breakpoint_site(fifth),
        Err(DebuggerError::NoHardwareSlot)
    ));

    // freeing a slot makes room again
    proc.disable_breakpoint_site(ids[1]).unwrap();
    let dr7: u64 = proc.registers().read_by_id_as(RegisterId::Dr(7)).unwrap();
    let local_enables = (0..4).filter(|i| dr7 & (1 << (i * 2)) != 0).count();
    assert_eq!(local_enables, 3);
    proc.enable_breakpoint_site(fifth).unwrap();
}

#[test]
fn hardware_breakpoint_fires_at_entry() {
    let mut proc = launch("true");
    let entry = entry_point(&proc);

    let site_id = proc
        .create_breakpoint_site(entry, true, false)
        .unwrap()
        .id();
    proc.enable_breakpoint_site(site_id).unwrap();

    proc.resume().unwrap();
    let reason = proc.wait_on_signal().unwrap();
    assert_eq!(reason.state, ProcessState::Stopped);
    assert_eq!(reason.trap, Some(TrapType::HardwareBreak));
    assert_eq!(proc.pc(), entry);
    assert_eq!(
        proc.current_hardware_stoppoint().unwrap(),
        HardwareStoppoint::Site(site_id)
    );

    proc.disable_breakpoint_site(site_id).unwrap();
    proc.resume().unwrap();
    assert_eq!(proc.wait_on_signal().unwrap().state, ProcessState::Exited);
}

#[test]
fn watchpoint_catches_stack_write() {
    let mut proc = launch("true");
    let rsp: u64 = proc.registers().read_by_id_as(RegisterId::Rsp).unwrap();
    // the first call instruction pushes its return address right below rsp
    let below_stack = VirtAddr::new((rsp - 8) & !7);

    let watch_id = proc
        .create_watchpoint(below_stack, StoppointMode::Write, 8)
        .unwrap()
        .id();
    proc.enable_watchpoint(watch_id).unwrap();

    proc.resume().unwrap();
    let reason = proc.wait_on_signal().unwrap();
    assert_eq!(reason.state, ProcessState::Stopped);
    assert_eq!(reason.trap, Some(TrapType::HardwareBreak));
    assert_eq!(
        proc.current_hardware_stoppoint().unwrap(),
        HardwareStoppoint::Watch(watch_id)
    );

    // the hit refreshed the watched data
    let watch = proc.watchpoints().get_by_id(watch_id).unwrap();
    assert_ne!(watch.data(), watch.previous_data());

    proc.disable_watchpoint(watch_id).unwrap();
    proc.resume().unwrap();
    assert_eq!(proc.wait_on_signal().unwrap().state, ProcessState::Exited);
}

#[test]
fn watchpoint_rejects_execute_mode() {
    let mut proc = launch("true");
    assert!(matches!(
        proc.create_watchpoint(VirtAddr::new(0x1000), StoppointMode::Execute, 4),
        Err(DebuggerError::ExecuteModeWatchpoint)
    ));
    assert!(matches!(
        proc.create_watchpoint(VirtAddr::new(0x1000), StoppointMode::Write, 3),
        Err(DebuggerError::InvalidStoppointSize(3))
    ));
}

#[test]
fn syscall_catch_policy_pairs_write() {
    let (read_fd, write_fd) = nix::unistd::pipe().expect("pipe");
    let mut proc = Process::launch("echo", &["hello".to_string()], true, Some(write_fd))
        .expect("launch failed");
    proc.set_syscall_catch_policy(SyscallCatchPolicy::Some(vec![Sysno::write]));

    let mut caught = Vec::new();
    loop {
        proc.resume().expect("resume");
        let reason = proc.wait_on_signal().expect("wait");
        if reason.state != ProcessState::Stopped {
            assert_eq!(reason.state, ProcessState::Exited);
            break;
        }
        assert_eq!(reason.trap, Some(TrapType::Syscall), "only write stops");
        caught.push(reason.syscall.expect("syscall stops carry info"));
    }
    drop(read_fd);

    // every caught entry is followed by its exit with the same id
    assert!(!caught.is_empty());
    assert_eq!(caught.len() % 2, 0);
    for pair in caught.chunks_exact(2) {
        assert!(pair[0].is_entry());
        assert!(!pair[1].is_entry());
        assert_eq!(pair[0].id(), pair[1].id());
        assert_eq!(pair[0].id(), Sysno::write as u64);
    }
}
