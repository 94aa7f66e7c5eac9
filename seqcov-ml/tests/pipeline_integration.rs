//! End-to-end evaluation and training runs on temporary directories.

use std::path::Path;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use seqcov_core::{EvaluateConfig, TrainConfig};
use seqcov_ml::data::records::write_records;
use seqcov_ml::data::{JobParams, SeqRecord};
use seqcov_ml::eval::{EvaluateOptions, Evaluator, run_evaluation};
use seqcov_ml::model::{CompositionModel, SeqModel};
use seqcov_ml::training::{
    BEST_MODEL_FILE, GenomeData, StdoutReporter, StopReason, Trainer, TrainerConfig,
};

const SEQ_LENGTH: usize = 64;
const TARGET_LENGTH: usize = 16;

/// GC-rich bins get high coverage on target 0, AT-rich bins on target 1.
fn synthetic_records(n: usize, seed: u64) -> Vec<SeqRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bin = SEQ_LENGTH / TARGET_LENGTH;
    (0..n)
        .map(|_| {
            let sequence: String = (0..SEQ_LENGTH)
                .map(|_| ['A', 'C', 'G', 'T'][rng.gen_range(0..4)])
                .collect();
            let targets = sequence
                .as_bytes()
                .chunks(bin)
                .map(|w| {
                    let gc = w.iter().filter(|&&b| b == b'G' || b == b'C').count() as f32;
                    vec![gc * 3.0, (bin as f32 - gc) * 2.0]
                })
                .collect();
            SeqRecord { sequence, targets }
        })
        .collect()
}

fn write_params(path: &Path, num_targets: &str) {
    std::fs::write(
        path,
        format!(
            r#"{{"model": {{"seq_length": {SEQ_LENGTH}, "target_length": {TARGET_LENGTH}, "num_targets": {num_targets}}},
                "train": {{"batch_size": 4, "learning_rate": 0.2, "patience": 3}}}}"#
        ),
    )
    .unwrap();
}

fn write_data_dir(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("targets.txt"),
        "index\tidentifier\tfile\tdescription\n0\tGC1\tgc.bw\tDNase:gc rich\n1\tAT1\tat.bw\tCAGE:at rich\n",
    )
    .unwrap();
    write_records(&dir.join("records/test-0.jsonl"), &synthetic_records(12, 1)).unwrap();
    write_records(&dir.join("records/test-1.jsonl"), &synthetic_records(6, 2)).unwrap();
    write_records(&dir.join("records/train-0.jsonl"), &synthetic_records(40, 3)).unwrap();
    write_records(&dir.join("records/valid-0.jsonl"), &synthetic_records(8, 4)).unwrap();
}

#[test]
fn test_evaluate_writes_all_outputs() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    write_data_dir(&data_dir);
    let params_file = dir.path().join("params.json");
    write_params(&params_file, "2");

    let params = JobParams::from_file(&params_file).unwrap();
    let model_file = dir.path().join(BEST_MODEL_FILE);
    CompositionModel::from_params(&params, false, 5)
        .unwrap()
        .save(&model_file)
        .unwrap();

    let mut config = EvaluateConfig::default();
    config.out_dir = dir.path().join("test_out");
    let mut options = EvaluateOptions::new(&params_file, &model_file, &data_dir, &config);
    options.rc = true;
    options.shifts = vec![0, 1, -1];
    options.save = true;
    options.peaks = true;
    options.accuracy_indexes = vec![0, 1];

    let mut model = CompositionModel::from_params(&params, false, 99).unwrap();
    let report = run_evaluation(options, &mut model).unwrap();
    assert!(report.summary.loss.is_finite());
    assert_eq!(report.summary.r2.len(), 2);

    let out = dir.path().join("test_out");
    let acc = std::fs::read_to_string(out.join("acc.txt")).unwrap();
    let lines: Vec<&str> = acc.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("   0  "));
    assert!(lines[0].ends_with("         GC1  DNase:gc rich"));

    let peaks = std::fs::read_to_string(out.join("peaks.txt")).unwrap();
    assert_eq!(peaks.lines().count(), 2);
    let peak_report = report.peaks.unwrap();
    assert!((0.0..=1.0).contains(&peak_report.mean_auroc));

    assert!(out.join("preds.npy").is_file());
    assert!(out.join("targets.npy").is_file());
    for sub in ["scatter", "violin", "roc", "pr"] {
        assert!(out.join(sub).join("t1.txt").is_file(), "missing {sub}/t1.txt");
    }

    let mut buf = Vec::new();
    seqcov_ml::EvaluationReport {
        summary: report.summary.clone(),
        peaks: None,
        out_dir: out.clone(),
    }
    .print_to(&mut buf)
    .unwrap();
    assert!(String::from_utf8(buf).unwrap().contains("Test PearsonR:"));
}

#[test]
fn test_evaluate_missing_records_is_an_error() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    write_data_dir(&data_dir);
    let params_file = dir.path().join("params.json");
    write_params(&params_file, "2");

    let mut config = EvaluateConfig::default();
    config.tfr_pattern = "nothing-*.jsonl".to_string();
    let options = EvaluateOptions::new(&params_file, "model.tf", &data_dir, &config);
    assert!(Evaluator::new(options).is_err());
}

#[test]
fn test_evaluate_unknown_accuracy_index_is_an_error() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    write_data_dir(&data_dir);
    let params_file = dir.path().join("params.json");
    write_params(&params_file, "2");
    let params = JobParams::from_file(&params_file).unwrap();

    let mut config = EvaluateConfig::default();
    config.out_dir = dir.path().join("out");
    let mut options = EvaluateOptions::new(&params_file, "unused", &data_dir, &config);
    options.accuracy_indexes = vec![7];

    let evaluator = Evaluator::new(options).unwrap();
    let model = CompositionModel::from_params(&params, false, 1).unwrap();
    assert!(evaluator.evaluate(&model).is_err());
}

#[tokio::test]
async fn test_train_then_evaluate() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    write_data_dir(&data_dir);
    let params_file = dir.path().join("params.json");
    write_params(&params_file, "[2]");
    let params = JobParams::from_file(&params_file).unwrap();

    let records = data_dir.join("records");
    let genome = GenomeData::open(
        &records.join("train-*.jsonl"),
        &records.join("valid-*.jsonl"),
        &params,
        0,
    )
    .unwrap();
    assert!(genome.train.is_some() && genome.valid.is_some());

    let mut settings = TrainConfig::default();
    settings.logdir = dir.path().join("logs");
    settings.train_epochs = Some(4);
    settings.augment_rc = true;
    settings.augment_shifts = vec![0, 1];
    let config = TrainerConfig::from_settings(&settings, &params);
    assert_eq!(config.patience, 3);
    let summary_log = config.summary_log();

    let model = CompositionModel::from_params(&params, false, settings.seed).unwrap();
    let mut trainer = Trainer::new(model, vec![genome], config).unwrap();
    let outcome = trainer
        .run(StdoutReporter::new(Some(summary_log.clone())))
        .await
        .unwrap();

    assert!(outcome.epochs >= 1 && outcome.epochs <= 4);
    assert_eq!(outcome.steps, outcome.epochs * 10);
    if outcome.epochs < 4 {
        assert_eq!(outcome.stop_reason, StopReason::EarlyStopping);
    }
    assert!(outcome.best_epoch.is_some());

    let best = dir.path().join("logs").join(BEST_MODEL_FILE);
    assert!(best.is_file());
    assert!(dir.path().join("logs/checkpoints.json").is_file());
    let logged = std::fs::read_to_string(&summary_log).unwrap();
    assert_eq!(logged.lines().count(), outcome.epochs);

    let mut config = EvaluateConfig::default();
    config.out_dir = dir.path().join("eval");
    let options = EvaluateOptions::new(&params_file, &best, &data_dir, &config);
    let mut model = CompositionModel::from_params(&params, false, 0).unwrap();
    let report = run_evaluation(options, &mut model).unwrap();
    assert!(report.summary.loss.is_finite());
}
