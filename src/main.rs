use graphleiden::leiden::{ConsiderComms, Graph, Optimiser, OptimiserConfig, Partition, Quality};
use graphleiden::readwrite::{ncol, nsl};
use graphleiden::{Error, ErrorKind};
use std::env;
use std::fs;
use std::process;

struct Args {
    input: String,
    output: Option<String>,
    format: InputFormat,
    res_format: ResultFormat,
    directed: bool,
    quality: Quality,
    seed: Option<u64>,
    no_refine: bool,
    max_comm_size: Option<u64>,
}

#[derive(Clone, Copy)]
enum InputFormat {
    NslE,
    Nsa,
    Ncol,
}

/// How the resulting partition is written out: one `label community` pair
/// per line (the default), or one line per community listing its member
/// labels, largest community first (CNL, "cluster node list" — the format
/// this family of tools' own evaluation utilities consume).
#[derive(Clone, Copy)]
enum ResultFormat {
    LabelCommunity,
    Cnl,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, Error> {
    argv.next(); // program name

    let mut input = None;
    let mut output = None;
    let mut format: Option<InputFormat> = None;
    let mut res_format = ResultFormat::LabelCommunity;
    let mut directed = false;
    let mut gamma = 1.0;
    let mut quality_name = "cpm".to_string();
    let mut seed = None;
    let mut no_refine = false;
    let mut max_comm_size = None;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--inp-fmt" => {
                let v = next_value(&mut argv, "--inp-fmt")?;
                format = Some(match v.as_str() {
                    "nsl-e" => InputFormat::NslE,
                    "nsa" => InputFormat::Nsa,
                    "ncol" => InputFormat::Ncol,
                    other => {
                        return Err(arg_error(format!("unknown --inp-fmt '{}'", other)));
                    }
                });
            }
            "--res-fmt" => {
                let v = next_value(&mut argv, "--res-fmt")?;
                res_format = match v.as_str() {
                    "lst" => ResultFormat::LabelCommunity,
                    "cnl" => ResultFormat::Cnl,
                    other => {
                        return Err(arg_error(format!("unknown --res-fmt '{}'", other)));
                    }
                };
            }
            "--directed" => directed = true,
            "--gamma" => gamma = parse_value(&mut argv, "--gamma")?,
            "--seed" => seed = Some(parse_value(&mut argv, "--seed")?),
            "--quality" => quality_name = next_value(&mut argv, "--quality")?,
            "--no-refine" => no_refine = true,
            "--max-comm-size" => max_comm_size = Some(parse_value(&mut argv, "--max-comm-size")?),
            "-o" | "--output" => output = Some(next_value(&mut argv, "--output")?),
            other if !other.starts_with('-') && input.is_none() => input = Some(other.to_string()),
            other => return Err(arg_error(format!("unrecognised argument '{}'", other))),
        }
    }

    let input = input.ok_or_else(|| arg_error("missing input file path".to_string()))?;
    let format = format.unwrap_or_else(|| infer_format(&input));
    let quality = match quality_name.as_str() {
        "modularity" => Quality::Modularity,
        "cpm" => Quality::cpm(gamma),
        "rber" => Quality::rber(gamma),
        "rbconfiguration" => Quality::rb_configuration(gamma),
        "significance" => Quality::Significance,
        "surprise" => Quality::Surprise,
        other => return Err(arg_error(format!("unknown --quality '{}'", other))),
    };

    Ok(Args {
        input,
        output,
        format,
        res_format,
        directed,
        quality,
        seed,
        no_refine,
        max_comm_size,
    })
}

/// Infers the input format from `input`'s file extension when `--inp-fmt`
/// is not given explicitly: `.nse` → NSL-E, `.nsa` → NSA, `.ncol` → NCOL,
/// anything else falls back to NSL-E. Mirrors `loadGraphNSL`'s own
/// extension sniffing, generalised from directedness (the only thing the
/// extension decides there, since NSL-E and NSA share one parser) to
/// format selection (since this crate's NCOL loader is a distinct parser).
fn infer_format(input: &str) -> InputFormat {
    match input.rsplit('.').next() {
        Some("nse") => InputFormat::NslE,
        Some("nsa") => InputFormat::Nsa,
        Some("ncol") => InputFormat::Ncol,
        _ => InputFormat::NslE,
    }
}

fn next_value(argv: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, Error> {
    argv.next()
        .ok_or_else(|| arg_error(format!("{} requires a value", flag)))
}

fn parse_value<T: std::str::FromStr>(
    argv: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T, Error> {
    let raw = next_value(argv, flag)?;
    raw.parse()
        .map_err(|_| arg_error(format!("{} expects a number, got '{}'", flag, raw)))
}

fn arg_error(message: String) -> Error {
    Error::new(ErrorKind::ArgumentParsingError, message)
}

fn load_graph(args: &Args) -> Result<(Graph, Vec<String>), Error> {
    match args.format {
        InputFormat::NslE => {
            let g = nsl::read_nsl_e_file(&args.input, args.directed)?;
            let labels = (0..g.vcount()).map(|v| v.to_string()).collect();
            Ok((g, labels))
        }
        InputFormat::Nsa => {
            let g = nsl::read_nsa_file(&args.input, args.directed)?;
            let labels = (0..g.vcount()).map(|v| v.to_string()).collect();
            Ok((g, labels))
        }
        InputFormat::Ncol => ncol::read_ncol_file(&args.input, args.directed),
    }
}

fn run(args: Args) -> Result<(), Error> {
    let (graph, labels) = load_graph(&args)?;
    let mut partition = Partition::singleton(&graph, args.quality);

    let config = OptimiserConfig::new()
        .consider_comms(ConsiderComms::AllNeighComms)
        .refine_partition(!args.no_refine)
        .max_comm_size(args.max_comm_size)
        .seed(args.seed);
    let mut optimiser = Optimiser::new(config);
    optimiser.optimise_partition(&mut partition)?;
    partition.renumber_communities();

    let output = match args.res_format {
        ResultFormat::LabelCommunity => {
            let mut out = String::new();
            for v in 0..graph.vcount() {
                out.push_str(&format!("{} {}\n", labels[v], partition.membership(v)));
            }
            out
        }
        ResultFormat::Cnl => {
            let mut out = String::new();
            for c in 0..partition.n_communities() {
                let members: Vec<&str> = partition
                    .get_community(c)
                    .into_iter()
                    .map(|v| labels[v].as_str())
                    .collect();
                out.push_str(&members.join(" "));
                out.push('\n');
            }
            out
        }
    };

    match args.output {
        Some(path) => fs::write(&path, output).map_err(|e| {
            Error::new(
                ErrorKind::ArgumentParsingError,
                format!("could not write {}: {}", path, e),
            )
        })?,
        None => print!("{}", output),
    }

    eprintln!(
        "quality ({}): {:.6}, communities: {}",
        partition.quality_fn().name(),
        partition.quality(),
        partition.n_communities()
    );
    Ok(())
}

fn main() {
    let args = match parse_args(env::args()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    if let Err(e) = run(args) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
