use std::collections::HashMap;
use std::rc::Rc;

use crate::command::{Command, CommandId};
use crate::commands::{config_gen, convert, correctness, data, export, performance};
use crate::config::Config;
use crate::error::PorterError;
use crate::format::{Format, Framework, Variant, format_runtimes};
use crate::pipeline::Pipeline;
use crate::sample::Dataloader;

/// Build the command graph for one run: preprocessing first, then exports,
/// conversions and their checks per requested format, wiring `requires`
/// edges so exports precede conversions and conversions precede the
/// correctness / performance commands for the same artifact.
///
/// Shared intermediates are memoized by (format, variant): when two
/// requested formats route through the same intermediate the graph holds a
/// single node with two downstream edges. A prerequisite the user did not
/// request is still inserted, but marked unrequested so it does not count
/// toward the requested outputs in the report.
pub fn build_pipeline(
    config: &Config,
    loader: Rc<dyn Dataloader>,
) -> Result<Pipeline, PorterError> {
    config.validate()?;
    match config.framework {
        Framework::Torch => torch_pipeline(config, loader),
        Framework::TensorFlow => tensorflow_pipeline(config, loader),
        Framework::Onnx => onnx_pipeline(config, loader),
    }
}

struct GraphBuilder<'a> {
    config: &'a Config,
    pipeline: Pipeline,
    memo: HashMap<(Format, Variant), CommandId>,
    preprocessing: Vec<CommandId>,
}

impl<'a> GraphBuilder<'a> {
    fn new(
        name: &str,
        framework: Framework,
        config: &'a Config,
        loader: Rc<dyn Dataloader>,
    ) -> Result<Self, PorterError> {
        let mut pipeline = Pipeline::new(name, framework);
        let infer_input = pipeline.add(data::infer_input_metadata(loader.clone()))?;
        let fetch =
            pipeline.add(data::fetch_input_samples(loader).requires(vec![infer_input]))?;
        let infer_output =
            pipeline.add(data::infer_output_metadata().requires(vec![infer_input, fetch]))?;
        Ok(Self {
            config,
            pipeline,
            memo: HashMap::new(),
            preprocessing: vec![infer_input, fetch, infer_output],
        })
    }

    fn wants(&self, format: Format) -> bool {
        self.config.target_formats.contains(&format)
    }

    /// Insert an export/convert command once per (format, variant); later
    /// callers get the memoized node. The first insertion decides the
    /// requested flag.
    fn ensure(
        &mut self,
        format: Format,
        variant: Variant,
        requested: bool,
        requires: Vec<CommandId>,
        make: impl FnOnce() -> Command,
    ) -> Result<CommandId, PorterError> {
        if let Some(&id) = self.memo.get(&(format, variant)) {
            return Ok(id);
        }
        let mut command = make().requires(requires);
        if !requested {
            command = command.not_requested();
        }
        let id = self.pipeline.add(command)?;
        self.memo.insert((format, variant), id);
        Ok(id)
    }

    /// Correctness and performance for one converted artifact, one command
    /// per runtime the format runs on.
    fn attach_checks(
        &mut self,
        format: Format,
        variant: Variant,
        produced_by: CommandId,
        requested: bool,
    ) -> Result<(), PorterError> {
        for &runtime in format_runtimes(format) {
            if self.config.run_correctness {
                let mut command =
                    correctness::correctness(format, variant, runtime).requires(vec![produced_by]);
                if !requested {
                    command = command.not_requested();
                }
                self.pipeline.add(command)?;
            }
            if self.config.run_profiling {
                let mut command =
                    performance::performance(format, variant, runtime).requires(vec![produced_by]);
                if !requested {
                    command = command.not_requested();
                }
                self.pipeline.add(command)?;
            }
        }
        Ok(())
    }

    fn attach_config_gen(
        &mut self,
        format: Format,
        variant: Variant,
        produced_by: CommandId,
    ) -> Result<(), PorterError> {
        self.pipeline
            .add(config_gen::config_gen(format, variant).requires(vec![produced_by]))?;
        Ok(())
    }

    fn attach_data_dumps(&mut self) -> Result<(), PorterError> {
        if !self.config.save_data {
            return Ok(());
        }
        let &[infer_input, fetch, infer_output] = &self.preprocessing[..] else {
            return Err(PorterError::config("preprocessing chain not built"));
        };
        self.pipeline
            .add(data::dump_input_data().requires(vec![infer_input, fetch]))?;
        self.pipeline
            .add(data::dump_output_data().requires(vec![fetch, infer_output]))?;
        Ok(())
    }

    fn finish(mut self) -> Result<Pipeline, PorterError> {
        self.attach_data_dumps()?;
        Ok(self.pipeline)
    }
}

fn torch_pipeline(config: &Config, loader: Rc<dyn Dataloader>) -> Result<Pipeline, PorterError> {
    let mut b = GraphBuilder::new("PyTorch pipeline", Framework::Torch, config, loader)?;
    let pre = b.preprocessing.clone();

    if b.wants(Format::TorchScript) {
        for &jit in &config.target_jit_types {
            let variant = Variant {
                jit: Some(jit),
                ..Variant::default()
            };
            let id = b.ensure(Format::TorchScript, variant, true, pre.clone(), || {
                export::export_torchscript(jit)
            })?;
            b.attach_config_gen(Format::TorchScript, variant, id)?;
        }
    }

    if b.wants(Format::Onnx) {
        let id = b.ensure(Format::Onnx, Variant::default(), true, pre.clone(), || {
            export::export_onnx()
        })?;
        b.attach_config_gen(Format::Onnx, Variant::default(), id)?;
    }

    if b.wants(Format::TorchTrt) {
        for &jit in &config.target_jit_types {
            let base_variant = Variant {
                jit: Some(jit),
                ..Variant::default()
            };
            let base = b.ensure(
                Format::TorchScript,
                base_variant,
                b.wants(Format::TorchScript),
                pre.clone(),
                || export::export_torchscript(jit),
            )?;
            for &precision in &config.target_precisions {
                let variant = Variant {
                    precision: Some(precision),
                    ..base_variant
                };
                let converted = b.ensure(Format::TorchTrt, variant, true, vec![base], || {
                    convert::convert_torchscript_to_torchtrt(jit, precision)
                })?;
                b.attach_checks(Format::TorchTrt, variant, converted, true)?;
                b.attach_config_gen(Format::TorchTrt, variant, converted)?;
            }
        }
    }

    if b.wants(Format::Trt) {
        let base = b.ensure(
            Format::Onnx,
            Variant::default(),
            b.wants(Format::Onnx),
            pre.clone(),
            export::export_onnx,
        )?;
        for &precision in &config.target_precisions {
            let variant = Variant {
                precision: Some(precision),
                ..Variant::default()
            };
            let converted = b.ensure(Format::Trt, variant, true, vec![base], || {
                convert::convert_onnx_to_trt(precision, None, None)
            })?;
            b.attach_checks(Format::Trt, variant, converted, true)?;
            b.attach_config_gen(Format::Trt, variant, converted)?;
        }
    }

    b.finish()
}

fn tensorflow_pipeline(
    config: &Config,
    loader: Rc<dyn Dataloader>,
) -> Result<Pipeline, PorterError> {
    let mut b = GraphBuilder::new("TensorFlow pipeline", Framework::TensorFlow, config, loader)?;
    let pre = b.preprocessing.clone();

    let xla_variants: Vec<Option<bool>> = if config.enable_xla.is_empty() {
        vec![None]
    } else {
        config.enable_xla.iter().map(|&v| Some(v)).collect()
    };
    let jit_variants: Vec<Option<bool>> = if config.jit_compile.is_empty() {
        vec![None]
    } else {
        config.jit_compile.iter().map(|&v| Some(v)).collect()
    };

    for &enable_xla in &xla_variants {
        for &jit_compile in &jit_variants {
            let sm_variant = Variant {
                enable_xla,
                jit_compile,
                ..Variant::default()
            };
            let savedmodel = b.ensure(
                Format::TfSavedmodel,
                sm_variant,
                b.wants(Format::TfSavedmodel),
                pre.clone(),
                || export::export_savedmodel(enable_xla, jit_compile),
            )?;
            if b.wants(Format::TfSavedmodel) {
                b.attach_config_gen(Format::TfSavedmodel, sm_variant, savedmodel)?;
            }

            if b.wants(Format::Onnx) || b.wants(Format::Trt) {
                let onnx = b.ensure(
                    Format::Onnx,
                    sm_variant,
                    b.wants(Format::Onnx),
                    vec![savedmodel],
                    || convert::convert_savedmodel_to_onnx(enable_xla, jit_compile),
                )?;
                b.attach_checks(Format::Onnx, sm_variant, onnx, b.wants(Format::Onnx))?;
                if b.wants(Format::Onnx) {
                    b.attach_config_gen(Format::Onnx, sm_variant, onnx)?;
                }

                if b.wants(Format::Trt) {
                    for &precision in &config.target_precisions {
                        let variant = Variant {
                            precision: Some(precision),
                            ..sm_variant
                        };
                        let converted = b.ensure(Format::Trt, variant, true, vec![onnx], || {
                            convert::convert_onnx_to_trt(precision, enable_xla, jit_compile)
                        })?;
                        b.attach_checks(Format::Trt, variant, converted, true)?;
                        b.attach_config_gen(Format::Trt, variant, converted)?;
                    }
                }
            }

            if b.wants(Format::TfTrt) {
                for &precision in &config.target_precisions {
                    let variant = Variant {
                        precision: Some(precision),
                        ..sm_variant
                    };
                    let converted = b.ensure(Format::TfTrt, variant, true, vec![savedmodel], || {
                        convert::convert_savedmodel_to_tftrt(precision, enable_xla, jit_compile)
                    })?;
                    b.attach_checks(Format::TfTrt, variant, converted, true)?;
                    b.attach_config_gen(Format::TfTrt, variant, converted)?;
                }
            }
        }
    }

    b.finish()
}

fn onnx_pipeline(config: &Config, loader: Rc<dyn Dataloader>) -> Result<Pipeline, PorterError> {
    let mut b = GraphBuilder::new("ONNX pipeline", Framework::Onnx, config, loader)?;
    let pre = b.preprocessing.clone();

    let staged = b.ensure(
        Format::Onnx,
        Variant::default(),
        b.wants(Format::Onnx),
        pre,
        export::stage_onnx,
    )?;
    if b.wants(Format::Onnx) {
        b.attach_config_gen(Format::Onnx, Variant::default(), staged)?;
    }

    if b.wants(Format::Trt) {
        for &precision in &config.target_precisions {
            let variant = Variant {
                precision: Some(precision),
                ..Variant::default()
            };
            let converted = b.ensure(Format::Trt, variant, true, vec![staged], || {
                convert::convert_onnx_to_trt(precision, None, None)
            })?;
            b.attach_checks(Format::Trt, variant, converted, true)?;
            b.attach_config_gen(Format::Trt, variant, converted)?;
        }
    }

    b.finish()
}
