use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use porter_ml::adapter;
use porter_ml::builders;
use porter_ml::config::{
    Config, DEFAULT_MAX_WORKSPACE_SIZE, DEFAULT_MINIMUM_SEGMENT_SIZE, DEFAULT_MODEL_NAME,
    DEFAULT_OPSET, DEFAULT_SAMPLE_COUNT, DEFAULT_WORKDIR,
};
use porter_ml::context::ExecutionContext;
use porter_ml::executor::Executor;
use porter_ml::format::{Format, Framework, JitType, Precision};
use porter_ml::report::RunReport;
use porter_ml::sample::{Dataloader, JsonDataloader};

#[derive(Parser, Debug)]
#[command(
    name = "porter-ml",
    about = "Convert ML models between serving formats and validate the results",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export a source model and convert it to the requested target formats
    Convert {
        /// Source framework of the model
        #[arg(long)]
        framework: Framework,
        /// Path to the source model (file or SavedModel directory)
        #[arg(long)]
        model: PathBuf,
        /// Model name used in artifact metadata and the report
        #[arg(long, default_value = DEFAULT_MODEL_NAME)]
        model_name: String,
        /// Working directory for artifacts and the report
        #[arg(long, default_value = DEFAULT_WORKDIR)]
        workdir: PathBuf,
        /// Wipe and recreate the workdir before running
        #[arg(long, default_value_t = false)]
        override_workdir: bool,
        /// Target formats; defaults to everything the framework supports
        #[arg(long, value_delimiter = ',')]
        target_formats: Vec<Format>,
        /// TensorRT-family build precisions
        #[arg(long, value_delimiter = ',', default_values_t = [Precision::Fp32, Precision::Fp16])]
        target_precisions: Vec<Precision>,
        /// TorchScript capture modes
        #[arg(long, value_delimiter = ',', default_values_t = [JitType::Script, JitType::Trace])]
        target_jit_types: Vec<JitType>,
        /// XLA variants for TensorFlow exports (e.g. --enable-xla true,false)
        #[arg(long, value_delimiter = ',')]
        enable_xla: Vec<bool>,
        /// jit_compile variants for TensorFlow exports
        #[arg(long, value_delimiter = ',')]
        jit_compile: Vec<bool>,
        /// JSON file with validation samples; synthetic names are inferred
        #[arg(long)]
        samples: PathBuf,
        /// ONNX opset for exports and conversions
        #[arg(long, default_value_t = DEFAULT_OPSET)]
        opset: u32,
        /// Number of dataloader samples fetched for validation
        #[arg(long, default_value_t = DEFAULT_SAMPLE_COUNT)]
        sample_count: usize,
        /// Absolute tolerance for correctness checks
        #[arg(long)]
        atol: Option<f64>,
        /// Relative tolerance for correctness checks
        #[arg(long)]
        rtol: Option<f64>,
        /// Batch dimension index; pass --no-batching to disable
        #[arg(long, default_value_t = 0, conflicts_with = "no_batching")]
        batch_dim: usize,
        /// Treat the model as non-batching
        #[arg(long, default_value_t = false)]
        no_batching: bool,
        /// TensorRT builder workspace in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_WORKSPACE_SIZE)]
        max_workspace_size: u64,
        /// TF-TRT minimum segment size
        #[arg(long, default_value_t = DEFAULT_MINIMUM_SEGMENT_SIZE)]
        minimum_segment_size: u32,
        /// Override input tensor names, in dataloader order
        #[arg(long, value_delimiter = ',')]
        input_names: Option<Vec<String>>,
        /// Override output tensor names, in model output order
        #[arg(long, value_delimiter = ',')]
        output_names: Option<Vec<String>>,
        /// Skip dumping input/output samples under the workdir
        #[arg(long, default_value_t = false)]
        no_save_data: bool,
        /// Skip correctness checks on converted artifacts
        #[arg(long, default_value_t = false)]
        no_correctness: bool,
        /// Skip performance benchmarks on converted artifacts
        #[arg(long, default_value_t = false)]
        no_profiling: bool,
        /// Print the planned commands without executing
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_plan(pipeline: &porter_ml::pipeline::Pipeline) -> Result<()> {
    println!("{}: {} commands", pipeline.name, pipeline.len());
    for &id in &pipeline.execution_order()? {
        let command = pipeline.get(id);
        let deps: Vec<String> = command
            .requires
            .iter()
            .map(|d| d.index().to_string())
            .collect();
        let marker = if command.requested { " " } else { "*" };
        println!(
            "  [{:>3}]{} {:<12} {}  (after: {})",
            id.index(),
            marker,
            command.kind.to_string(),
            command.name,
            if deps.is_empty() {
                "-".to_string()
            } else {
                deps.join(", ")
            }
        );
    }
    println!("  (* = prerequisite inserted for a requested format)");
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!(
        "\n{:<52} {:<12} {:>9}  {}",
        "Command", "Status", "Time", "Artifact"
    );
    for entry in &report.commands {
        let duration = entry
            .duration_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".to_string());
        let artifact = entry
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "{:<52} {:<12} {:>9}  {}",
            entry.name,
            entry.status.to_string(),
            duration,
            artifact
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Convert {
            framework,
            model,
            model_name,
            workdir,
            override_workdir,
            target_formats,
            target_precisions,
            target_jit_types,
            enable_xla,
            jit_compile,
            samples,
            opset,
            sample_count,
            atol,
            rtol,
            batch_dim,
            no_batching,
            max_workspace_size,
            minimum_segment_size,
            input_names,
            output_names,
            no_save_data,
            no_correctness,
            no_profiling,
            dry_run,
        } => {
            let mut config = Config::new(framework, model);
            config.model_name = model_name;
            config.workdir = workdir;
            config.override_workdir = override_workdir;
            if !target_formats.is_empty() {
                config.target_formats = target_formats;
            }
            config.target_precisions = target_precisions;
            config.target_jit_types = target_jit_types;
            config.enable_xla = enable_xla;
            config.jit_compile = jit_compile;
            config.opset = opset;
            config.sample_count = sample_count;
            config.atol = atol;
            config.rtol = rtol;
            config.batch_dim = if no_batching { None } else { Some(batch_dim) };
            config.max_workspace_size = max_workspace_size;
            config.minimum_segment_size = minimum_segment_size;
            config.input_names = input_names;
            config.output_names = output_names;
            config.save_data = !no_save_data;
            config.run_correctness = !no_correctness;
            config.run_profiling = !no_profiling;
            config.verbose = args.verbose > 0;

            info!(
                framework = %config.framework,
                model = %config.model_path.display(),
                workdir = %config.workdir.display(),
                formats = ?config.target_formats,
                dry_run,
                "starting convert"
            );

            let loader: Rc<dyn Dataloader> = Rc::new(JsonDataloader::from_path(&samples)?);
            let mut pipeline = builders::build_pipeline(&config, loader)?;

            if dry_run {
                print_plan(&pipeline)?;
                info!("dry-run completed; nothing executed");
                return Ok(());
            }

            config.prepare_workdir()?;
            let adapter = adapter::adapter_for(config.framework);
            let ctx = ExecutionContext::new(&config, adapter.as_ref());
            let report = Executor::run(&mut pipeline, &ctx)?;

            print_summary(&report);
            println!(
                "\nReport written to {}",
                config
                    .workdir
                    .join(porter_ml::report::STATUS_FILENAME)
                    .display()
            );

            let failures = report.requested_failures();
            if failures > 0 {
                warn!(failures, "some requested commands failed");
                bail!("{failures} requested command(s) failed; see the report for details");
            }
            info!(commands = report.commands.len(), "convert completed");
        }
    }

    Ok(())
}
