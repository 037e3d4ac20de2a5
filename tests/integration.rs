//! End-to-end tests over the synthetic source

use approx::assert_relative_eq;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

use speed_trajectory_mtl::data::{
    BatchSource, FeedBuilder, NormBounds, SyntheticConfig, SyntheticSource,
};
use speed_trajectory_mtl::model::{ModelConfig, MultiTaskModel};
use speed_trajectory_mtl::training::{save_checkpoint, CheckpointMeta, METADATA_FILE, WEIGHTS_FILE};
use speed_trajectory_mtl::{Error, Trainer, TrainingConfig};

fn tiny_model() -> ModelConfig {
    ModelConfig {
        site_num: 4,
        emb_size: 8,
        field_cnt: 9,
        feature_s: 1,
        feature_tra: 18,
        input_length: 2,
        output_length: 2,
        trajectory_length: 3,
        num_heads: 2,
        num_blocks: 1,
        dropout: 0.1,
    }
}

fn training_config(save_path: &std::path::Path) -> TrainingConfig {
    TrainingConfig {
        epoch: 1,
        batch_size: 10,
        divide_ratio: 0.5,
        learning_rate: 0.001,
        save_path: save_path.to_path_buf(),
        validate_every: 5,
        // untrained errors can exceed the default threshold
        initial_best_mae: f64::INFINITY,
        ..Default::default()
    }
}

/// 100 training samples and 100 held-out samples, of which 40 are used
fn source(model: &ModelConfig) -> SyntheticSource {
    SyntheticSource::new(SyntheticConfig::for_model(model, 200).with_divide_ratio(0.5))
}

#[test]
fn test_training_writes_best_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let model = tiny_model();
    let mut trainer = Trainer::new(model.clone(), training_config(dir.path()), Device::Cpu).unwrap();

    let summary = trainer.run_epoch(&source(&model)).unwrap();

    assert_eq!(summary.steps, 10);
    assert!(summary.final_loss.is_finite());
    // steps 0 and 5
    assert_eq!(summary.validations, 2);
    assert!(summary.checkpoints_written >= 1);
    assert!(summary.checkpoints_written <= summary.validations);

    assert!(dir.path().join(WEIGHTS_FILE).exists());
    let meta: CheckpointMeta =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap())
            .unwrap();
    assert_eq!(Some(meta.mae), summary.best_mae);
    assert!(meta.step == 0 || meta.step == 5);
}

#[test]
fn test_evaluation_restores_best_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let model = tiny_model();
    let data = source(&model);

    let mut trainer = Trainer::new(model.clone(), training_config(dir.path()), Device::Cpu).unwrap();
    let best = trainer.run_epoch(&data).unwrap().best_mae.unwrap();

    let config = TrainingConfig {
        is_training: false,
        ..training_config(dir.path())
    };
    let mut evaluator = Trainer::new(model, config, Device::Cpu).unwrap();
    let report = evaluator.evaluate(&data).unwrap();

    assert_eq!(report.batches, 4);
    assert_eq!(report.samples, 40);
    assert_relative_eq!(report.total_time.mae, best, max_relative = 1e-4);
}

#[test]
fn test_evaluation_without_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let model = tiny_model();
    let config = TrainingConfig {
        is_training: false,
        ..training_config(dir.path())
    };
    let mut trainer = Trainer::new(model.clone(), config, Device::Cpu).unwrap();

    let err = trainer.evaluate(&source(&model)).unwrap_err();
    assert!(matches!(err, Error::CheckpointNotFound(_)));
}

#[test]
fn test_report_units() {
    let dir = tempfile::tempdir().unwrap();
    let model = tiny_model();
    let mut synthetic = SyntheticConfig::for_model(&model, 200).with_divide_ratio(0.5);
    synthetic.speed_bounds = NormBounds::new(20.0, 140.0);
    let data = SyntheticSource::new(synthetic);

    // raw pass, then a denormalizing pass over the same weights
    let raw_config = TrainingConfig {
        normalize: false,
        ..training_config(dir.path())
    };
    let mut raw_trainer = Trainer::new(model.clone(), raw_config, Device::Cpu).unwrap();
    let raw = raw_trainer.evaluate(&data).unwrap();
    save_checkpoint(raw_trainer.varmap(), dir.path(), 0, raw.total_time.mae).unwrap();

    let denorm_config = TrainingConfig {
        normalize: true,
        is_training: false,
        ..training_config(dir.path())
    };
    let mut denorm_trainer = Trainer::new(model.clone(), denorm_config, Device::Cpu).unwrap();
    let denorm = denorm_trainer.evaluate(&data).unwrap();

    assert_eq!(raw.speed.n_samples, 40 * 4 * 2);
    assert_eq!(raw.segment_time.n_samples, 40 * 3);
    assert!(raw.speed.mae > 0.0);
    assert_relative_eq!(denorm.speed.mae, raw.speed.mae * 120.0, max_relative = 1e-4);
    assert_relative_eq!(denorm.speed.rmse, raw.speed.rmse * 120.0, max_relative = 1e-4);
    // travel times do not depend on speed normalization
    assert_relative_eq!(denorm.total_time.mae, raw.total_time.mae, max_relative = 1e-4);

    // minute-valued MAE of the same held-out batches
    let feeds = FeedBuilder::new(model.clone(), Device::Cpu);
    let mut batches = data.next_batch(10, 1, false).unwrap();
    let (mut abs_sum, mut count) = (0.0f64, 0usize);
    for _ in 0..raw.batches {
        let batch = batches.next().unwrap().unwrap();
        let out = raw_trainer.model().forward(&feeds.build(&batch).unwrap()).unwrap();
        let pred = out.total.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for (p, l) in pred.iter().zip(batch.total_time.iter()) {
            abs_sum += (*p as f64 - *l as f64).abs();
            count += 1;
        }
    }
    assert_eq!(count, 40);
    let minutes_mae = abs_sum / count as f64;
    assert_relative_eq!(raw.total_time.mae, minutes_mae * 60.0, max_relative = 1e-4);
}

#[test]
fn test_too_few_trajectories() {
    let dir = tempfile::tempdir().unwrap();
    let model = tiny_model();
    let small = SyntheticSource::new(SyntheticConfig::for_model(&model, 12).with_divide_ratio(0.5));
    let mut trainer = Trainer::new(model, training_config(dir.path()), Device::Cpu).unwrap();

    assert!(matches!(trainer.run_epoch(&small), Err(Error::InsufficientData(_))));
}

#[test]
fn test_zero_speed_features_give_finite_predictions() {
    let model_config = tiny_model();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = MultiTaskModel::new(&model_config, vb).unwrap();

    let raw = source(&model_config)
        .next_batch(10, 1, true)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    let mut feed = FeedBuilder::new(model_config.clone(), Device::Cpu)
        .build(&raw)
        .unwrap();
    feed.feature_s = Tensor::zeros(feed.feature_s.dims(), DType::F32, &Device::Cpu).unwrap();

    let out = model.forward(&feed).unwrap();
    for t in [&out.speed, &out.separate, &out.total] {
        let values = t.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_placeholder_shapes_follow_config() {
    for (site_num, input_length, output_length, trajectory_length) in
        [(3, 1, 1, 2), (5, 4, 2, 3), (7, 2, 6, 5)]
    {
        let config = ModelConfig {
            site_num,
            input_length,
            output_length,
            trajectory_length,
            ..tiny_model()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = MultiTaskModel::new(&config, vb).unwrap();
        let p = model.placeholders();

        assert_eq!(p.position.expected_dims(), vec![1, site_num]);
        assert_eq!(p.feature_s.expected_dims(), vec![0, input_length, site_num, 1]);
        assert_eq!(p.label_s.expected_dims(), vec![0, site_num, output_length]);
        assert_eq!(p.label_tra.expected_dims(), vec![0, trajectory_length]);
        assert_eq!(p.trajectory_inds.expected_dims(), vec![trajectory_length]);

        let raw = SyntheticSource::new(SyntheticConfig::for_model(&config, 20))
            .next_batch(4, 1, true)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let feed = FeedBuilder::new(config.clone(), Device::Cpu).build(&raw).unwrap();
        assert!(feed.validate(p, config.total_length()).is_ok());

        let mut bad = feed.clone();
        bad.label_tra = Tensor::zeros((4, trajectory_length + 1), DType::F32, &Device::Cpu).unwrap();
        assert!(bad.validate(p, config.total_length()).unwrap_err().is_shape_error());
    }
}
