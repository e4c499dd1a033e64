// Line-oriented operator console for the robot panel.
// Run with: cargo run -p robot_panel -- --host 127.0.0.1 --port 3021
// Against the simulator: cargo run -p sim, then connect to 127.0.0.1:3021.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use robot_panel::config::executable_dir;
use robot_panel::logging::init_logging;
use robot_panel::{JogSteps, PanelConfig, PanelEvent, RobotPanel};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_FILE: &str = "robot_panel.toml";
const TICK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "robot-panel", about = "Drive a Lebai arm and play back teaching programs")]
struct Args {
    /// Configuration file. Defaults to robot_panel.toml next to the executable, if present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Robot controller host, overrides the configuration.
    #[arg(long)]
    host: Option<String>,

    /// Robot controller port, overrides the configuration.
    #[arg(long)]
    port: Option<u16>,

    /// Teaching program played by a bare `teach` command.
    #[arg(long)]
    teach: Option<PathBuf>,

    /// Connect immediately after startup.
    #[arg(long)]
    connect: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Console {
    Connect(Option<(String, u16)>),
    Disconnect,
    PowerOff,
    Stop,
    Sync,
    Joint(usize, f64),
    Jog(usize, f64),
    Velocity(f64),
    Acceleration(f64),
    Grip(f64),
    Force(f64),
    Steps(f64, f64, f64),
    Home,
    Reset,
    Teach(Option<PathBuf>),
    StopTeach,
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  connect [host port]   connect and run the handshake
  disconnect | poweroff stop the system or power it down
  stop                  stop the current motion
  sync                  read the actual joint angles
  joint <1-6> <deg>     set one joint
  jog <1-6> <+|->       jog one joint by the joint step
  vel <v> | acc <a>     motion parameters
  grip <0-100>          gripper opening
  force <0-100>         gripper force
  steps <joint> <motion> <gripper>
  home | reset          home move (configured) or sequential reset
  teach [file]          start a teaching program
  stopteach             cancel the teaching program
  status | help | quit";

fn parse_console(line: &str) -> Result<Console, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = words.split_first() else {
        return Err(String::new());
    };

    let number = |i: usize| -> Result<f64, String> {
        let word = args.get(i).ok_or_else(|| format!("{}: missing argument", command))?;
        word.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| format!("{}: '{}' is not a number", command, word))
    };
    let joint = || -> Result<usize, String> {
        let word = args.first().ok_or_else(|| format!("{}: missing joint", command))?;
        match word.parse::<usize>() {
            Ok(n @ 1..=6) => Ok(n - 1),
            _ => Err(format!("{}: joint must be 1-6", command)),
        }
    };

    let parsed = match command.to_ascii_lowercase().as_str() {
        "connect" => match args {
            [] => Console::Connect(None),
            [host, port] => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("connect: invalid port '{}'", port))?;
                Console::Connect(Some((host.to_string(), port)))
            }
            _ => return Err("connect: expected no arguments or <host> <port>".into()),
        },
        "disconnect" => Console::Disconnect,
        "poweroff" => Console::PowerOff,
        "stop" => Console::Stop,
        "sync" => Console::Sync,
        "joint" => Console::Joint(joint()?, number(1)?),
        "jog" => {
            let direction = match args.get(1).copied() {
                Some("+") => 1.0,
                Some("-") => -1.0,
                _ => return Err("jog: direction must be + or -".into()),
            };
            Console::Jog(joint()?, direction)
        }
        "vel" => Console::Velocity(number(0)?),
        "acc" => Console::Acceleration(number(0)?),
        "grip" => Console::Grip(number(0)?),
        "force" => Console::Force(number(0)?),
        "steps" => Console::Steps(number(0)?, number(1)?, number(2)?),
        "home" => Console::Home,
        "reset" => Console::Reset,
        "teach" => Console::Teach(args.first().map(PathBuf::from)),
        "stopteach" => Console::StopTeach,
        "status" => Console::Status,
        "help" | "?" => Console::Help,
        "quit" | "exit" => Console::Quit,
        other => return Err(format!("unknown command '{}', try help", other)),
    };
    Ok(parsed)
}

/// Runs one console command. Long operations are spawned so `stop` and `stopteach` stay
/// responsive.
fn dispatch(panel: &RobotPanel, command: Console, default_teaching: Option<PathBuf>) {
    let panel = panel.clone();
    match command {
        Console::Connect(target) => {
            let (host, port) = target.unwrap_or_else(|| {
                let robot = &panel.config().robot;
                (robot.host.clone(), robot.port)
            });
            tokio::spawn(async move {
                let _ = panel.connect(&host, port).await;
            });
        }
        Console::Disconnect => {
            tokio::spawn(async move { panel.disconnect().await });
        }
        Console::PowerOff => {
            tokio::spawn(async move { panel.power_off().await });
        }
        Console::Stop => {
            tokio::spawn(async move {
                let _ = panel.stop_motion().await;
            });
        }
        Console::Sync => {
            tokio::spawn(async move {
                let _ = panel.sync_position().await;
            });
        }
        Console::Joint(index, degrees) => {
            tokio::spawn(async move {
                let _ = panel.set_joint_angle(index, degrees).await;
            });
        }
        Console::Jog(index, direction) => {
            tokio::spawn(async move {
                let _ = panel.jog_joint(index, direction).await;
            });
        }
        Console::Velocity(v) => {
            panel.set_velocity(v);
        }
        Console::Acceleration(a) => {
            panel.set_acceleration(a);
        }
        Console::Grip(amplitude) => {
            if let Err(e) = panel.set_gripper_amplitude(amplitude) {
                println!("gripper ignored: {}", e);
            }
        }
        Console::Force(force) => {
            if let Err(e) = panel.set_gripper_force(force) {
                println!("gripper ignored: {}", e);
            }
        }
        Console::Steps(joint, motion, gripper) => {
            panel.set_jog_steps(JogSteps::new(joint, motion, gripper));
        }
        Console::Home => {
            tokio::spawn(async move {
                let _ = panel.move_home().await;
            });
        }
        Console::Reset => {
            tokio::spawn(async move {
                let _ = panel.reset_sequential().await;
            });
        }
        Console::Teach(path) => {
            if let Ok(handle) = panel.start_teaching_file(path.or(default_teaching)) {
                tokio::spawn(async move {
                    let outcome = handle.join().await;
                    info!("Teaching finished: {:?}", outcome);
                });
            }
        }
        Console::StopTeach => {
            tokio::spawn(async move {
                panel.stop_teaching().await;
            });
        }
        Console::Status => print_snapshot(&panel),
        Console::Help => println!("{}", HELP),
        Console::Quit => {}
    }
}

fn print_snapshot(panel: &RobotPanel) {
    let s = panel.snapshot();
    let endpoint = s
        .endpoint
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:?} {} busy={} home={} teaching={} synced={}",
        s.phase, endpoint, s.busy, s.moving_home, s.teaching_running, s.position_synced
    );
    println!("joints  {}", format_joints(&s.joints.degrees()));
    println!(
        "gripper {:.0}% force {:.0}%  velocity {:.2} acc {:.2}",
        s.gripper.amplitude(),
        s.gripper.force(),
        s.motion.velocity(),
        s.motion.acceleration()
    );
    println!(
        "steps   joint {:.2}° motion {:.2} gripper {:.1}%  playback {:?}",
        s.jog.joint_deg(),
        s.jog.motion(),
        s.jog.gripper(),
        s.playback
    );
}

fn format_joints(degrees: &[f64; 6]) -> String {
    degrees
        .iter()
        .enumerate()
        .map(|(i, d)| format!("J{} {:7.2}°", i + 1, d))
        .collect::<Vec<_>>()
        .join("  ")
}

fn load_config(args: &Args) -> Result<PanelConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PanelConfig::load(path)?,
        None => {
            let path = executable_dir().join(DEFAULT_CONFIG_FILE);
            if path.exists() {
                PanelConfig::load(&path)?
            } else {
                PanelConfig::default()
            }
        }
    };
    if let Some(host) = &args.host {
        config.robot.host = host.clone();
    }
    if let Some(port) = args.port {
        config.robot.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let log_path = config.log_file_in(&executable_dir());
    let _log_guard = init_logging(&log_path, &config.log.level)?;
    info!(
        "robot-panel starting, log file {}, robot {}:{}",
        log_path.display(),
        config.robot.host,
        config.robot.port
    );

    let panel = RobotPanel::new(config)?;

    let mut events = panel.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                // Status lines already reach stdout through the log.
                Ok(PanelEvent::Joints(pose)) => println!("joints  {}", format_joints(&pose.degrees())),
                Ok(PanelEvent::Gripper(g)) => {
                    println!("gripper {:.0}% force {:.0}%", g.amplitude(), g.force())
                }
                Ok(PanelEvent::TeachingMode(on)) => {
                    println!("manual controls {}", if on { "locked" } else { "unlocked" })
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Console missed {} panel events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let ticker = panel.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            ticker.tick();
        }
    });

    if args.connect {
        dispatch(&panel, Console::Connect(None), None);
    }

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        };
        match parse_console(&line) {
            Ok(Console::Quit) => break,
            Ok(command) => dispatch(&panel, command, args.teach.clone()),
            Err(message) if message.is_empty() => {}
            Err(message) => println!("{}", message),
        }
    }

    info!("robot-panel shutting down");
    panel.stop_teaching().await;
    Ok(())
}
