//! Whole programs on the RV64 core, driven by the scheduler.

#![allow(clippy::pedantic, clippy::nursery)]

use std::collections::VecDeque;

use driver_core::{
    render_signature, run, Command, ExecutionFrame, Gpr, InstructionLink, Model, NullReference,
    PlatformConfig, ProtocolError, RunConfig, RunContext, RunStats, SignatureRange,
    TerminationReason, TracePacket,
};
use proptest as _;
use rstest::rstest;
use rv_model::{event_multiplexer, ModelEvent, Rv64Core, Rv64Reference, DEFAULT_TOHOST};
use thiserror as _;
use tracing as _;

const BASE: u64 = 0x8000_0000;

/// Writes `t1` to `tohost` (`BASE + 0x1000`) and spins.
fn exit_program(t1: u32) -> Vec<u32> {
    vec![
        0x0000_1297,              // auipc t0, 1
        0x0000_0313 | (t1 << 20), // addi t1, x0, t1
        0x0062_B023,              // sd t1, 0(t0)
        0x0000_006F,              // j .
    ]
}

fn platform() -> PlatformConfig {
    PlatformConfig {
        ram_size: 0x1_0000,
        ..PlatformConfig::default()
    }
}

fn bytes(program: &[u32]) -> Vec<u8> {
    program.iter().flat_map(|word| word.to_le_bytes()).collect()
}

fn core_running(program: &[u32]) -> Rv64Core {
    let mut core = Rv64Core::new(&platform());
    core.load_image(BASE, &bytes(program)).expect("program fits");
    core.set_tohost(Some(DEFAULT_TOHOST));
    core
}

fn reference_running(program: &[u32]) -> Rv64Reference {
    Rv64Reference::new(core_running(program)).expect("reference")
}

#[rstest]
#[case(1, 0)]
#[case(7, 3)]
fn tohost_write_completes_the_run(#[case] value: u32, #[case] exit_code: u64) {
    let mut core = core_running(&exit_program(value));
    let mut events = event_multiplexer().expect("table");
    let mut stats = RunStats::default();
    let reason = run(RunContext {
        config: &RunConfig::default(),
        model: &mut core,
        reference: &mut NullReference,
        events: &mut events,
        link: None,
        stats: &mut stats,
    })
    .expect("run");

    assert_eq!(reason, TerminationReason::Completed { exit_code });
    // Five reset-vector instructions plus three program instructions.
    assert_eq!(core.state().instructions(), 8);
}

#[test]
fn spinning_program_stops_at_the_limit() {
    let mut core = core_running(&[0x0000_006F]);
    let mut events = event_multiplexer().expect("table");
    let mut stats = RunStats::default();
    let config = RunConfig {
        insn_limit: 50,
        ..RunConfig::default()
    };
    let reason = run(RunContext {
        config: &config,
        model: &mut core,
        reference: &mut NullReference,
        events: &mut events,
        link: None,
        stats: &mut stats,
    })
    .expect("run");
    assert_eq!(reason, TerminationReason::InstructionLimitReached);
    assert_eq!(core.state().pc(), BASE);
}

#[test]
fn selected_store_events_reach_their_counter_on_each_tick() {
    let program = [
        0x0020_0393, // addi t2, x0, 2
        0x3233_9073, // csrw mhpmevent3, t2
        0x0000_1297, // auipc t0, 1
        0x0002_B423, // sd x0, 8(t0)
        0x0002_B823, // sd x0, 16(t0)
        0x0010_0313, // addi t1, x0, 1
        0xFE62_BC23, // sd t1, -8(t0)
        0x0000_006F, // j .
    ];
    let mut core = Rv64Core::new(&PlatformConfig {
        boot_rom: false,
        ..platform()
    });
    core.load_image(BASE, &bytes(&program)).expect("fits");
    core.set_tohost(Some(BASE + 0x1000));
    let mut events = event_multiplexer().expect("table");
    let mut stats = RunStats::default();
    let config = RunConfig {
        insns_per_tick: 1,
        ..RunConfig::default()
    };
    let reason = run(RunContext {
        config: &config,
        model: &mut core,
        reference: &mut NullReference,
        events: &mut events,
        link: None,
        stats: &mut stats,
    })
    .expect("run");

    assert_eq!(reason, TerminationReason::Completed { exit_code: 0 });
    assert_eq!(
        core.state().csr.hpm.selector(0),
        Some(ModelEvent::Store.platform_event_id())
    );
    assert_eq!(core.state().csr.hpm.counter(0), Some(3));
    assert_eq!(core.state().csr.hpm.counter(1), Some(0));
}

fn run_tandem(core: &mut Rv64Core, reference: &mut Rv64Reference) -> TerminationReason {
    let mut events = event_multiplexer().expect("table");
    let mut stats = RunStats::default();
    let config = RunConfig {
        tandem: true,
        insn_limit: 100,
        ..RunConfig::default()
    };
    run(RunContext {
        config: &config,
        model: core,
        reference,
        events: &mut events,
        link: None,
        stats: &mut stats,
    })
    .expect("run")
}

#[test]
fn identical_cores_agree_in_tandem() {
    let program = exit_program(1);
    let mut core = core_running(&program);
    let mut reference = reference_running(&program);
    assert_eq!(
        run_tandem(&mut core, &mut reference),
        TerminationReason::Completed { exit_code: 0 }
    );
}

#[test]
fn differing_programs_diverge() {
    let mut core = core_running(&exit_program(1));
    let mut reference = reference_running(&exit_program(7));
    assert_eq!(
        run_tandem(&mut core, &mut reference),
        TerminationReason::Diverged
    );
    // The reset vector and `auipc` agree; `addi t1` is the first difference.
    assert_eq!(core.state().instructions(), 7);
    assert_eq!(core.state().gpr(Gpr::from_u5(6)), 1);
}

#[test]
fn signature_reads_back_program_memory() {
    let core = core_running(&exit_program(1));
    let signature = render_signature(
        SignatureRange {
            start: BASE,
            end: BASE + 8,
        },
        &core,
    )
    .expect("valid range");
    assert_eq!(signature, "00001297\n00100313\n");
}

#[derive(Default)]
struct Injector {
    commands: VecDeque<Command>,
    frames: Vec<ExecutionFrame>,
}

impl InstructionLink for Injector {
    fn receive_command(&mut self) -> Result<Option<Command>, ProtocolError> {
        Ok(self.commands.pop_front())
    }

    fn send_result(&mut self, packet: &TracePacket) -> Result<(), ProtocolError> {
        self.frames.push(ExecutionFrame::from_bytes(packet.as_bytes()?)?);
        Ok(())
    }
}

#[test]
fn injected_instructions_execute_from_the_ram_base() {
    let mut core = Rv64Core::new(&PlatformConfig::protocol());
    let mut link = Injector {
        commands: [
            Command::Instruction { encoding: 0x0050_0093 }, // addi x1, x0, 5
            Command::Instruction { encoding: 0x0010_8113 }, // addi x2, x1, 1
            Command::Instruction { encoding: 0x0000_0000 }, // illegal
            Command::EndOfTrace,
        ]
        .into(),
        frames: Vec::new(),
    };
    let mut events = event_multiplexer().expect("table");
    let mut stats = RunStats::default();
    let config = RunConfig {
        protocol_port: Some(0),
        ..RunConfig::default()
    };
    let reason = run(RunContext {
        config: &config,
        model: &mut core,
        reference: &mut NullReference,
        events: &mut events,
        link: Some(&mut link),
        stats: &mut stats,
    })
    .expect("run");

    assert_eq!(reason, TerminationReason::TraceEnded);
    let frames = &link.frames;
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0].pc_rdata, BASE);
    assert_eq!((frames[0].rd_addr, frames[0].rd_wdata), (1, 5));
    assert_eq!((frames[1].rs1_addr, frames[1].rs1_data), (1, 5));
    assert_eq!(frames[1].rd_wdata, 6);
    assert_eq!(frames[2].trap, 1);
    assert_eq!(frames[2].order, 2);
    assert!(frames[3].is_halted());
}
