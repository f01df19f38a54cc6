use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use sics::{Assembler, Computer, MEMORY_SIZE};

/// Sics is a simulator and in-memory assembler toolchain for the SBNZ
/// one-instruction computer.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a flat binary memory image
    Run {
        /// Image file to load at address 0
        name: PathBuf,
        /// Step budget, since non-terminating programs are not detected
        #[arg(short, long, default_value_t = 1_000_000)]
        max_steps: usize,
    },
    /// Assemble the built-in multiply example and run it, or save its image
    Demo {
        /// Write the assembled image here instead of running it
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    match args.command {
        Some(Command::Run { name, max_steps }) => {
            file_message(Green, "Loading", &name);
            let image = fs::read(&name).into_diagnostic()?;
            if image.len() > MEMORY_SIZE {
                bail!("Image is {} bytes, larger than machine memory", image.len());
            }
            let mut computer = Computer::new();
            computer.load_memory(&image);

            message(Green, "Running", "loaded image");
            if !computer.run(max_steps) {
                bail!("Step budget of {max_steps} exhausted and the machine has not halted");
            }
            message(Green, "Halted", "reached the halt address");
            Ok(())
        }
        Some(Command::Demo { out }) => {
            message(Green, "Assembling", "multiply example (2 * 3)");
            let (image, result) = multiply_example()?;
            match out {
                Some(path) => {
                    let mut file = File::create(&path).into_diagnostic()?;
                    file.write_all(&image).into_diagnostic()?;
                    file_message(Green, "Saved", &path);
                }
                None => {
                    let mut computer = Computer::new();
                    computer.load_memory(&image);
                    message(Green, "Running", "emitted image");
                    if !computer.run(10_000) {
                        bail!("Demo program failed to halt");
                    }
                    message(Green, "Halted", "reached the halt address");
                    message(Cyan, "Result", &format!("2 * 3 = {}", computer.peek(result)));
                }
            }
            Ok(())
        }
        None => {
            println!("\n~ sics v{VERSION} ~");
            println!("{SHORT_INFO}");
            Ok(())
        }
    }
}

/// Multiply by repeated addition: `result = x * y`, then halt.
fn multiply_example() -> Result<(Vec<u8>, u16)> {
    let mut asm = Assembler::new();
    asm.mov("x", "counter");
    asm.define_label("loop")?;
    asm.beq("counter", "c0", "done");
    asm.add("y", "result", "result");
    asm.dec("counter");
    asm.jmp("loop");
    asm.define_label("done")?;
    asm.hlt();
    asm.define_label("x")?;
    asm.dd(&[2]);
    asm.define_label("y")?;
    asm.dd(&[3]);
    asm.define_label("c0")?;
    asm.dd(&[0]);
    asm.define_label("counter")?;
    asm.dd(&[0]);
    asm.define_label("result")?;
    asm.dd(&[0]);

    let result = asm.address_of("result").expect("label defined above");
    Ok((asm.assemble()?, result))
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &PathBuf) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

const SHORT_INFO: &str = r"
Welcome to sics, a simulator and in-memory assembler for the SBNZ
one-instruction computer (subtract and branch if not zero).
Please use `-h` or `--help` to access the usage instructions.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
