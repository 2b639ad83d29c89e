//! One process-level simulation session: build the models, drive the
//! scheduler, write the outputs.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context as _};
use driver_core::{
    check_reference_platform, run, write_signature, EventMultiplexer, InstructionLink, Model,
    NullReference, ReferenceModel, RemoteListener, RunContext, RunStats, TerminationReason,
};
use rv_model::{event_multiplexer, Rv64Core, Rv64Reference};
use tracing::{info, warn};

use crate::cli::Settings;

/// Runs `settings` to completion and returns the process exit status.
///
/// # Errors
///
/// Setup failures (missing image, bind errors, inconsistent reference) and
/// fatal run errors.
pub fn execute(settings: &Settings) -> anyhow::Result<u8> {
    if settings.report_arch {
        println!("RV64");
        return Ok(0);
    }

    let mut stats = RunStats::new(settings.run.show_times);
    let mut events = event_multiplexer().context("building the HPM event table")?;
    let mut core = Rv64Core::new(&settings.platform);

    let status = match settings.run.protocol_port {
        Some(port) => serve_protocol(settings, port, &mut core, &mut events, &mut stats)?,
        None => run_image(settings, &mut core, &mut events, &mut stats)?,
    };

    if settings.run.show_times {
        stats.report();
    }
    Ok(status)
}

fn run_image(
    settings: &Settings,
    core: &mut Rv64Core,
    events: &mut EventMultiplexer,
    stats: &mut RunStats,
) -> anyhow::Result<u8> {
    let Some(image_path) = &settings.image else {
        bail!("no program image given");
    };
    let image = fs::read(image_path)
        .with_context(|| format!("reading program image {}", image_path.display()))?;
    core.load_image(settings.platform.ram_base, &image)
        .with_context(|| format!("loading {}", image_path.display()))?;
    core.set_tohost(Some(settings.tohost));
    info!(
        image = %image_path.display(),
        bytes = image.len(),
        base = %format!("{:#x}", settings.platform.ram_base),
        "image loaded"
    );

    let mut reference: Box<dyn ReferenceModel> = if settings.run.tandem {
        let reference = Rv64Reference::new(core.clone())?
            .with_insns_per_tick(settings.run.insns_per_tick);
        check_reference_platform(&settings.platform, &reference)?;
        Box::new(reference)
    } else {
        Box::new(NullReference)
    };

    stats.mark_initialized();
    let reason = run(RunContext {
        config: &settings.run,
        model: &mut *core,
        reference: reference.as_mut(),
        events: &mut *events,
        link: None,
        stats: &mut *stats,
    })?;
    stats.finish_run();
    info!("{reason}");

    if let Some((path, range)) = &settings.signature {
        write_signature(path, *range, &*core)
            .with_context(|| format!("writing signature {}", path.display()))?;
    }
    if let Some(path) = &settings.terminal_log {
        write_console(path, core.console())?;
    }
    Ok(reason.exit_status())
}

/// Accepts one peer and serves traces until it disconnects. Each ended trace
/// resets the model and the event multiplexer.
fn serve_protocol(
    settings: &Settings,
    port: u16,
    core: &mut Rv64Core,
    events: &mut EventMultiplexer,
    stats: &mut RunStats,
) -> anyhow::Result<u8> {
    let listener = RemoteListener::bind(port)?;
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening for the instruction-injection peer");
    }
    let mut link = listener.accept()?;
    stats.mark_initialized();

    let status = loop {
        let reason = run(RunContext {
            config: &settings.run,
            model: &mut *core,
            reference: &mut NullReference,
            events: &mut *events,
            link: Some(&mut link as &mut dyn InstructionLink),
            stats: &mut *stats,
        })?;
        match reason {
            TerminationReason::TraceEnded => {
                core.reset()?;
                events.reset();
            }
            TerminationReason::ProtocolClosed => break 0,
            other => {
                warn!("protocol session stopped: {other}");
                break other.exit_status();
            }
        }
    };
    stats.finish_run();
    Ok(status)
}

fn write_console(path: &Path, console: &[u8]) -> anyhow::Result<()> {
    fs::write(path, console).with_context(|| format!("writing terminal log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::{Read as _, Write as _};
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;

    use driver_core::{
        Command, ExecutionFrame, InstructionFrame, PlatformConfig, RunConfig, SetupError,
        EXECUTION_FRAME_BYTES,
    };

    use super::execute;
    use crate::cli::Settings;

    fn program() -> Vec<u8> {
        [0x0000_1297_u32, 0x0010_0313, 0x0062_B023, 0x0000_006F]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }

    fn image_settings(dir: &tempfile::TempDir) -> Settings {
        let image = dir.path().join("program.bin");
        fs::write(&image, program()).expect("write image");
        Settings {
            image: Some(image),
            platform: PlatformConfig {
                ram_size: 0x1_0000,
                ..PlatformConfig::default()
            },
            ..Settings::default()
        }
    }

    #[test]
    fn image_run_exits_cleanly_and_writes_the_console_log() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("console.txt");
        let settings = Settings {
            terminal_log: Some(log.clone()),
            ..image_settings(&dir)
        };
        assert_eq!(execute(&settings).expect("run"), 0);
        assert_eq!(fs::read(log).expect("log written"), b"");
    }

    #[test]
    fn tandem_run_agrees_with_its_own_reference() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut settings = image_settings(&dir);
        settings.run.tandem = true;
        assert_eq!(execute(&settings).expect("run"), 0);
    }

    #[test]
    fn missing_image_is_a_setup_failure() {
        let err = execute(&Settings::default()).expect_err("no image");
        assert!(err.to_string().contains("no program image"));
    }

    #[test]
    fn oversized_image_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut settings = image_settings(&dir);
        settings.platform.ram_size = 8;
        assert!(execute(&settings).is_err());
    }

    #[test]
    fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = taken.local_addr().expect("addr").port();
        let settings = Settings {
            run: RunConfig {
                protocol_port: Some(port),
                ..RunConfig::default()
            },
            platform: PlatformConfig::protocol(),
            ..Settings::default()
        };
        let err = execute(&settings).expect_err("port in use");
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::Bind { .. })
        ));
    }

    #[test]
    fn protocol_session_serves_traces_until_the_peer_leaves() {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = probe.local_addr().expect("addr").port();
        drop(probe);

        let settings = Settings {
            run: RunConfig {
                protocol_port: Some(port),
                ..RunConfig::default()
            },
            platform: PlatformConfig::protocol(),
            ..Settings::default()
        };
        let server = thread::spawn(move || execute(&settings));

        let mut stream = (0..50)
            .find_map(|_| {
                TcpStream::connect(("127.0.0.1", port)).ok().or_else(|| {
                    thread::sleep(Duration::from_millis(20));
                    None
                })
            })
            .expect("driver listening");

        let read_frame = |stream: &mut TcpStream| {
            let mut bytes = [0_u8; EXECUTION_FRAME_BYTES];
            stream.read_exact(&mut bytes).expect("frame");
            ExecutionFrame::from_bytes(&bytes).expect("decodes")
        };

        for _ in 0..2 {
            stream
                .write_all(&InstructionFrame::for_command(Command::Instruction {
                    encoding: 0x0050_0093,
                })
                .to_bytes())
                .expect("send addi");
            let frame = read_frame(&mut stream);
            assert_eq!(frame.pc_rdata, 0x8000_0000);
            assert_eq!((frame.rd_addr, frame.rd_wdata), (1, 5));

            stream
                .write_all(&InstructionFrame::for_command(Command::EndOfTrace).to_bytes())
                .expect("send end of trace");
            assert!(read_frame(&mut stream).is_halted());
        }
        drop(stream);

        let status = server.join().expect("server thread").expect("session");
        assert_eq!(status, 0);
    }
}
