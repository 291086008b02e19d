use std::{
    fmt,
    io::{Stdout, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::Parser;
use crossterm::{
    style::{Print, Stylize},
    ExecutableCommand, QueueableCommand,
};
use wam::{Machine, MachineConfig};

mod answer;
mod compiler;

use answer::{capture_variables, Answer};
use compiler::{compile, parse_term, CompiledUnit, OperatorTable, Term, TermParser};

struct EndOfLine;

impl fmt::Display for EndOfLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)
    }
}

struct PrintLn<T>(T);

impl<T: fmt::Display> crossterm::Command for PrintLn<T> {
    fn write_ansi(&self, f: &mut impl fmt::Write) -> fmt::Result {
        Print(&self.0).write_ansi(f)?;
        Print(EndOfLine).write_ansi(f)
    }

    #[cfg(windows)]
    fn execute_winapi(&self) -> crossterm::Result<()> {
        Print(&self.0).execute_winapi()?;
        Print(EndOfLine).execute_winapi()
    }

    #[cfg(windows)]
    fn is_ansi_code_supported(&self) -> bool {
        Print(&self.0).is_ansi_code_supported()
    }
}

#[derive(Parser)]
struct Cli {
    /// The file of program terms to unify queries against
    program: PathBuf,

    /// Run this query and exit rather than reading queries from the terminal
    #[arg(short, long = "query")]
    queries: Vec<String>,

    /// Print the compiled instructions of each query and program term
    #[arg(long)]
    show_code: bool,

    /// Print the state of the machine after each run
    #[arg(long)]
    dump_machine: bool,

    /// The maximum number of heap cells used by a query and a program term together
    #[arg(long)]
    heap_capacity: Option<usize>,

    /// The maximum number of instructions executed by a query and a program term together
    #[arg(long)]
    max_steps: Option<usize>,
}

enum Outcome {
    Yes(Answer),
    No,
}

struct Session {
    program: Vec<Term>,
    config: MachineConfig,
    show_code: bool,
    dump_machine: bool,
}

impl Session {
    fn run_unit(&self, stdout: &mut Stdout, unit: &CompiledUnit) -> anyhow::Result<Outcome> {
        let mut machine = Machine::new(unit.register_count(), self.config);

        machine
            .run(unit.query().instructions())
            .context("Failed to build the query")?;

        let query_variables = capture_variables(&machine, unit.query().variables())?;

        machine
            .run(unit.program().instructions())
            .context("Failed to unify the program")?;

        log::debug!("Heap grew to {} cells", machine.heap_top());

        if self.dump_machine {
            stdout.queue(PrintLn(&machine))?;
        }

        if machine.has_failed() {
            return Ok(Outcome::No);
        }

        let program_variables = capture_variables(&machine, unit.program().variables())?;

        Ok(Outcome::Yes(Answer::new(
            &machine,
            query_variables.into_iter().chain(program_variables),
        )?))
    }

    fn run_query(&self, stdout: &mut Stdout, source: &str) -> anyhow::Result<()> {
        let query = match parse_term(
            arcstr::literal!("<query>"),
            source.into(),
            OperatorTable::default(),
        ) {
            Ok(query) => query,
            Err(err) => {
                stdout.execute(PrintLn(err))?;
                return Ok(());
            }
        };

        for program in self.program.iter() {
            if self.program.len() > 1 {
                stdout.queue(PrintLn(format!("% {program}").dark_grey()))?;
            }

            let unit = match compile(&query, program) {
                Ok(unit) => unit,
                Err(err) => {
                    stdout.execute(PrintLn(err.to_string().red()))?;
                    continue;
                }
            };

            if self.show_code {
                stdout.queue(PrintLn(&unit))?;
            }

            match self.run_unit(stdout, &unit) {
                Ok(Outcome::Yes(answer)) => stdout.queue(Print(answer))?,
                Ok(Outcome::No) => stdout.queue(Print("no".red()))?,
                Err(err) => stdout.queue(Print(format!("{err:#}").red()))?,
            }
            .execute(PrintLn('.'))?;
        }

        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let Cli {
        program,
        queries,
        show_code,
        dump_machine,
        heap_capacity,
        max_steps,
    } = Cli::parse();

    let program = TermParser::from_file(program, OperatorTable::default())?
        .collect::<Result<Vec<_>, _>>()?;

    log::info!("Loaded {} program terms", program.len());

    let session = Session {
        program,
        config: MachineConfig {
            heap_capacity,
            max_steps,
        },
        show_code,
        dump_machine,
    };

    let mut stdout = std::io::stdout();

    if !queries.is_empty() {
        for query in queries {
            session.run_query(&mut stdout, &query)?;
        }

        return Ok(());
    }

    let stdin = std::io::stdin();

    loop {
        stdout.execute(Print("?- "))?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            stdout.execute(Print(EndOfLine))?;
            return Ok(());
        }

        let query = line.trim();

        if query.is_empty() {
            continue;
        }

        session.run_query(&mut stdout, query)?;
        stdout.flush()?;
    }
}
