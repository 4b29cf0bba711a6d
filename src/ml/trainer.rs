// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fine-tuning loop using Burn's DataLoader and AdamW.
//
// Schedule is counted in optimizer steps, not batches:
//   - gradients of `gradient_accumulation_steps` batches are
//     summed before each step (the last step of an epoch may
//     use fewer batches)
//   - learning rate decays linearly from `learning_rate` to 0
//     over all steps of the run
//   - every `logging_steps`: log mean train loss
//   - every `eval_steps`:    evaluate on the validation split,
//                            print the report, append metrics.csv
//   - every `save_steps`:    checkpoint, keep `save_total_limit`
//   - after the last epoch:  checkpoint + final evaluation
//
// Burn notes:
//   - Training uses MyBackend (Autodiff<Wgpu>) for gradients
//   - model.valid() returns the model on MyInnerBackend (Wgpu)
//     with dropout disabled; the validation batcher uses it too
//   - Each batch loss is divided by the accumulation count so the
//     summed gradient matches one large batch
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use std::sync::Arc;

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{SpeechBatch, SpeechBatcher},
    collator::PaddingCollator,
    dataset::SpeechDataset,
};
use crate::domain::{evaluation::EvaluationReport, label::LabelVocabulary};
use crate::infra::{
    checkpoint::{load_weights, CheckpointManager},
    metrics::{EvalMetrics, MetricsLogger},
};
use crate::ml::inferencer::evaluate_split;
use crate::ml::model::{FreezePolicy, SpeechClassifier};

type MyBackend      = burn::backend::Autodiff<burn::backend::Wgpu>;
type MyInnerBackend = burn::backend::Wgpu;

type ValLoader = Arc<dyn DataLoader<SpeechBatch<MyInnerBackend>>>;

pub fn run_training(
    cfg:            &TrainConfig,
    vocabulary:     &LabelVocabulary,
    train_dataset:  SpeechDataset,
    val_dataset:    SpeechDataset,
    ckpt_manager:   CheckpointManager,
    metrics_logger: MetricsLogger,
) -> Result<EvaluationReport> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop(cfg, vocabulary, train_dataset, val_dataset, ckpt_manager, metrics_logger, device)
}

/// Learning rate for optimizer step `step` (0-based) of `total_steps`.
pub fn linear_lr(base: f64, step: usize, total_steps: usize) -> f64 {
    if total_steps == 0 {
        return base;
    }
    base * total_steps.saturating_sub(step) as f64 / total_steps as f64
}

/// Running mean of batch losses, reset whenever it is read.
#[derive(Debug, Default)]
struct LossWindow {
    sum:     f64,
    batches: usize,
}

impl LossWindow {
    fn push(&mut self, loss: f64) {
        self.sum     += loss;
        self.batches += 1;
    }

    fn take_mean(&mut self) -> f64 {
        let mean = if self.batches > 0 { self.sum / self.batches as f64 } else { f64::NAN };
        *self = Self::default();
        mean
    }

    /// Like `take_mean`, but an empty window yields `previous`.
    fn take_mean_or(&mut self, previous: f64) -> f64 {
        if self.batches == 0 { previous } else { self.take_mean() }
    }
}

fn train_loop(
    cfg:            &TrainConfig,
    vocabulary:     &LabelVocabulary,
    train_dataset:  SpeechDataset,
    val_dataset:    SpeechDataset,
    ckpt_manager:   CheckpointManager,
    metrics_logger: MetricsLogger,
    device:         burn::backend::wgpu::WgpuDevice,
) -> Result<EvaluationReport> {

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: SpeechClassifier<MyBackend> =
        cfg.model_config(vocabulary.len(), true).init(&device);

    if let Some(path) = &cfg.init_weights {
        model = load_weights(path, model, &device)?;
        tracing::info!("Initial weights loaded from '{}'", path);
    }

    let policy = FreezePolicy::from_flags(cfg.freeze_encoder, cfg.freeze_base_model);
    let mut model = model.freeze(policy);
    tracing::info!(
        "Model ready: {} classes, conv_dim={}, hidden={}, frozen={:?}",
        vocabulary.len(), cfg.conv_dim, cfg.hidden_size, policy,
    );

    // ── AdamW optimiser ───────────────────────────────────────────────────────
    let mut optim = AdamWConfig::new().with_weight_decay(0.0).init();

    // ── Step bookkeeping ──────────────────────────────────────────────────────
    let num_train       = train_dataset.sample_count();
    let train_batches   = num_train.div_ceil(cfg.batch_size);
    let steps_per_epoch = cfg.steps_per_epoch(num_train);
    let total_steps     = steps_per_epoch * cfg.epochs;
    tracing::info!(
        "{} train / {} validation recordings, {} steps per epoch, {} steps total",
        num_train, val_dataset.sample_count(), steps_per_epoch, total_steps,
    );

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let collator      = PaddingCollator::new(cfg.padding);
    tracing::debug!("Padding strategy: {:?}", collator.strategy());
    let train_batcher = SpeechBatcher::<MyBackend>::new(device.clone(), collator);
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let val_batcher = SpeechBatcher::<MyInnerBackend>::new(device.clone(), collator);
    let val_loader: ValLoader = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut accumulator  = GradientsAccumulator::new();
    let mut pending      = 0usize;
    let mut global_step  = 0usize;
    let mut log_window   = LossWindow::default();
    let mut eval_window  = LossWindow::default();
    let mut last_train_loss = f64::NAN;
    let mut best_accuracy = 0.0f64;

    for epoch in 1..=cfg.epochs {
        for (i, batch) in train_loader.iter().enumerate() {
            let (loss, _) = model.forward_loss(
                batch.input_values,
                batch.attention_mask,
                batch.labels,
            );

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            log_window.push(loss_val);
            eval_window.push(loss_val);

            let loss  = loss.div_scalar(cfg.gradient_accumulation_steps as f64);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            accumulator.accumulate(&model, grads);
            pending += 1;

            let epoch_end = i + 1 == train_batches;
            if pending < cfg.gradient_accumulation_steps && !epoch_end {
                continue;
            }

            // ── Optimizer step ────────────────────────────────────────────────
            let lr = linear_lr(cfg.learning_rate, global_step, total_steps);
            model = optim.step(lr, model, accumulator.grads());
            pending      = 0;
            global_step += 1;

            if global_step % cfg.logging_steps == 0 {
                tracing::info!(
                    "step {:>5}/{} | epoch {:>3}/{} | loss={:.4} | lr={:.2e}",
                    global_step, total_steps, epoch, cfg.epochs, log_window.take_mean(), lr,
                );
            }

            if global_step % cfg.eval_steps == 0 {
                last_train_loss = eval_window.take_mean();
                let metrics = evaluate_step(
                    &model, &val_loader, vocabulary, global_step, epoch,
                    last_train_loss, &metrics_logger,
                )?;
                if metrics.is_improvement(best_accuracy) {
                    best_accuracy = metrics.accuracy;
                    tracing::info!("New best accuracy {:.4} at step {}", best_accuracy, global_step);
                }
            }

            if global_step % cfg.save_steps == 0 {
                save_checkpoint(&ckpt_manager, &model, global_step, cfg.save_total_limit)?;
            }
        }
    }

    // ── Final checkpoint + evaluation ─────────────────────────────────────────
    if global_step % cfg.save_steps != 0 {
        save_checkpoint(&ckpt_manager, &model, global_step, cfg.save_total_limit)?;
    }

    tracing::info!("Training complete after {} steps; running final evaluation", global_step);
    let model_valid = model.valid();
    let (report, eval_loss) = evaluate_split(&model_valid, &val_loader, vocabulary)?;
    // The last step may have been an eval step that already drained the window
    let train_loss = eval_window.take_mean_or(last_train_loss);
    print_report(global_step, cfg.epochs, train_loss, eval_loss, &report);
    metrics_logger.log(&EvalMetrics::new(global_step, cfg.epochs, train_loss, eval_loss, &report))?;
    Ok(report)
}

fn evaluate_step(
    model:      &SpeechClassifier<MyBackend>,
    val_loader: &ValLoader,
    vocabulary: &LabelVocabulary,
    step:       usize,
    epoch:      usize,
    train_loss: f64,
    logger:     &MetricsLogger,
) -> Result<EvalMetrics> {
    // model.valid() → SpeechClassifier<MyInnerBackend>, dropout disabled
    let model_valid = model.valid();
    let (report, eval_loss) = evaluate_split(&model_valid, val_loader, vocabulary)?;
    print_report(step, epoch, train_loss, eval_loss, &report);

    let metrics = EvalMetrics::new(step, epoch, train_loss, eval_loss, &report);
    logger.log(&metrics)?;
    Ok(metrics)
}

fn print_report(step: usize, epoch: usize, train_loss: f64, eval_loss: f64, report: &EvaluationReport) {
    println!(
        "Step {:>5} | epoch {:>3} | train_loss={:.4} | eval_loss={:.4} | accuracy={:.1}%",
        step, epoch, train_loss, eval_loss, report.accuracy * 100.0,
    );
    println!("{}", report.confusion);
    println!("{report}");
}

fn save_checkpoint(
    ckpt_manager: &CheckpointManager,
    model:        &SpeechClassifier<MyBackend>,
    step:         usize,
    keep:         usize,
) -> Result<()> {
    ckpt_manager.save_model(model, step)?;
    let removed = ckpt_manager.rotate(keep)?;
    tracing::info!("Checkpoint saved for step {} (removed {:?})", step, removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_lr_decays_to_zero() {
        assert!((linear_lr(3e-3, 0, 10) - 3e-3).abs() < 1e-12);
        assert!((linear_lr(3e-3, 5, 10) - 1.5e-3).abs() < 1e-12);
        assert_eq!(linear_lr(3e-3, 10, 10), 0.0);
        assert_eq!(linear_lr(3e-3, 12, 10), 0.0);
        assert_eq!(linear_lr(3e-3, 0, 0), 3e-3);
    }

    #[test]
    fn test_loss_window_resets() {
        let mut w = LossWindow::default();
        assert!(w.take_mean().is_nan());
        w.push(1.0);
        w.push(2.0);
        assert_eq!(w.take_mean(), 1.5);
        assert!(w.take_mean().is_nan());
    }

    #[test]
    fn test_drained_window_falls_back_to_previous_mean() {
        let mut w = LossWindow::default();
        w.push(0.5);
        w.push(0.7);
        let at_eval = w.take_mean();
        assert_eq!(w.take_mean_or(at_eval), at_eval);

        w.push(0.25);
        assert_eq!(w.take_mean_or(at_eval), 0.25);
    }
}
