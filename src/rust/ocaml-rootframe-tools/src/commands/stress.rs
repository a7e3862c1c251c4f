use anyhow::{bail, Result};
use colored::Colorize;
use ocaml_rootframe::checked::{self, CheckedFrame};
use ocaml_rootframe::sim::{self, structural_eq, SimConfig, SimHost, SimStats};
use ocaml_rootframe::Value;
use ocaml_rootframe_shared::MAX_ROOTS;
use prettytable::{format::consts::FORMAT_NO_LINESEP_WITH_TITLE, Table};
use rand::prelude::{Rng, SeedableRng, StdRng};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "run random nested frames against the simulated runtime with frequent collections")]
pub struct Options {
    /// Total number of frames to run
    #[structopt(long, default_value = "1000")]
    frames: usize,

    /// Deepest nesting of frames
    #[structopt(long, default_value = "8")]
    depth: usize,

    /// Collect after every this many allocations, 0 to only collect when the heap is full
    #[structopt(long, default_value = "7")]
    collect_every: usize,

    #[structopt(long, default_value = "1024")]
    heap_words: usize,

    /// Seed for the random frame shapes, random if not given
    #[structopt(long)]
    seed: Option<u64>,
}

pub fn run(options: Options) -> Result<()> {
    let seed = options.seed.unwrap_or_else(|| StdRng::from_entropy().gen());
    println!("Seed: {}", seed);

    let summary = stress(&options, seed)?;
    print_summary(&summary);
    println!(
        "{}",
        format!(
            "Every rooted value survived {} collections",
            summary.heap.collections
        )
        .green()
        .bold()
    );

    Ok(())
}

#[derive(Debug, Default)]
struct Summary {
    frames: usize,
    roots_checked: usize,
    max_depth: usize,
    extended: usize,
    locals: usize,
    returned: usize,
    heap: SimStats,
}

struct Stress<'a> {
    options: &'a Options,
    rng: StdRng,
    next_id: i64,
    summary: Summary,
}

enum Extension {
    None,
    XParam(usize),
    Local(usize),
}

// Every rooted value is a tuple of its id and a string naming it, so it can be rebuilt to compare
fn sample(id: i64) -> Value {
    let name = sim::alloc_string(&format!("root {}", id));
    sim::alloc_tuple(&[Value::int(id), name])
}

fn stress(options: &Options, seed: u64) -> Result<Summary> {
    sim::configure(SimConfig {
        heap_words: options.heap_words,
        collect_every: if options.collect_every == 0 {
            None
        } else {
            Some(options.collect_every)
        },
    });

    let mut stress = Stress {
        options,
        rng: StdRng::seed_from_u64(seed),
        next_id: 0,
        summary: Summary::default(),
    };

    while stress.summary.frames < options.frames {
        stress.frame(1)?;
    }

    if sim::registered_local_roots() != 0 {
        bail!(
            "{} roots still registered after every frame ended",
            sim::registered_local_roots()
        );
    }

    stress.summary.heap = sim::stats();
    Ok(stress.summary)
}

impl<'a> Stress<'a> {
    fn frame(&mut self, depth: usize) -> Result<()> {
        self.summary.frames += 1;
        self.summary.max_depth = self.summary.max_depth.max(depth);
        let roots_before = sim::registered_local_roots();

        let params = self.rng.gen_range(0..=MAX_ROOTS);
        let extension = match self.rng.gen_range(0..3) {
            0 => Extension::None,
            1 => Extension::XParam(self.rng.gen_range(1..=MAX_ROOTS)),
            _ => Extension::Local(self.rng.gen_range(1..=MAX_ROOTS)),
        };
        let extra = match extension {
            Extension::None => 0,
            Extension::XParam(n) | Extension::Local(n) => n,
        };

        // Never resized, so the pointers stay valid for the whole frame
        let mut slots = vec![Value::UNIT; params + extra];
        let base = slots.as_mut_ptr();
        let pointers: Vec<*mut Value> = (0..slots.len()).map(|i| unsafe { base.add(i) }).collect();

        let (frame, _) = unsafe { checked::begin_frame::<SimHost>(&pointers[..params])? };
        match extension {
            Extension::None => {}
            Extension::XParam(_) => {
                unsafe { checked::extend_frame::<SimHost>(frame, &pointers[params..])? };
                self.summary.extended += 1;
            }
            Extension::Local(_) => {
                unsafe { checked::local_frame::<SimHost>(frame, &pointers[params..])? };
                self.summary.locals += 1;
            }
        }

        if sim::registered_local_roots() != roots_before + pointers.len() {
            bail!("Frame at depth {} didn't register all its roots", depth);
        }

        // Everything is rooted now, so filling the slots can collect safely
        let mut ids = Vec::with_capacity(pointers.len());
        for &pointer in &pointers {
            self.next_id += 1;
            ids.push(self.next_id);
            let value = sample(self.next_id);
            unsafe { *pointer = value };
        }

        self.churn();

        if depth < self.options.depth {
            let children = self.rng.gen_range(0..3);
            for _ in 0..children {
                if self.summary.frames >= self.options.frames {
                    break;
                }
                self.frame(depth + 1)?;
                self.churn();
            }
        }

        self.verify(depth, &pointers, &ids)?;
        self.end(frame, &pointers)?;

        if sim::registered_local_roots() != roots_before {
            bail!("Frame at depth {} didn't unregister its roots", depth);
        }
        Ok(())
    }

    // Unrooted garbage to push the heap into collecting
    fn churn(&mut self) {
        for _ in 0..self.rng.gen_range(0..8) {
            sim::alloc_string("garbage");
        }
    }

    fn verify(&mut self, depth: usize, pointers: &[*mut Value], ids: &[i64]) -> Result<()> {
        for (&pointer, &id) in pointers.iter().zip(ids) {
            let expected = sample(id);
            let actual = unsafe { *pointer };

            if !sim::is_live(actual) || !structural_eq(actual, expected) {
                bail!("Root {} in a frame at depth {} lost its contents", id, depth);
            }
            self.summary.roots_checked += 1;
        }

        Ok(())
    }

    fn end(&mut self, frame: CheckedFrame, pointers: &[*mut Value]) -> Result<()> {
        match pointers.first() {
            Some(&first) if self.rng.gen_bool(0.5) => {
                let value = unsafe { *first };
                let (result, _) = checked::return_frame::<SimHost>(frame, value)?;
                if result != value {
                    bail!("Returned {:?} but {:?} was in the slot", result, value);
                }
                self.summary.returned += 1;
            }
            _ => {
                checked::drop_frame::<SimHost>(frame)?;
            }
        }

        Ok(())
    }
}

fn print_summary(summary: &Summary) {
    let mut table = Table::new();
    table.set_format(*FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row![b => "Measure", "Count"]);

    let rows = [
        ("Frames", summary.frames),
        ("Extended with xparam", summary.extended),
        ("Extended with locals", summary.locals),
        ("Ended with return", summary.returned),
        ("Deepest nesting", summary.max_depth),
        ("Roots checked", summary.roots_checked),
        ("Allocations", summary.heap.allocations),
        ("Collections", summary.heap.collections),
        ("Blocks copied", summary.heap.blocks_copied),
        ("Words copied", summary.heap.words_copied),
        ("Roots scanned", summary.heap.roots_scanned),
        ("Heap words", summary.heap.heap_words),
        ("Live words", summary.heap.live_words),
    ];

    for (name, count) in rows.iter() {
        table.add_row(row![name, r -> count]);
    }

    table.printstd();
}
