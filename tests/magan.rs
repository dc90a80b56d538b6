use std::collections::HashSet;

use magan::toy::{ToyDomains, TOY_DIM};
use magan::{
    DeviceConfig, FeatureCorrespondence, IdentityCorrespondence, Layer, Magan, MaganConfig, MaganError,
    ZeroCorrespondence,
};
use tch::{Device, Kind, Tensor};

fn cpu_config(dim_b1: i64, dim_b2: i64) -> MaganConfig {
    MaganConfig::new(dim_b1, dim_b2).with_device(DeviceConfig::cpu())
}

fn batches(n1: i64, dim_b1: i64, n2: i64, dim_b2: i64) -> (Tensor, Tensor) {
    let opts = (Kind::Float, Device::Cpu);
    (Tensor::randn([n1, dim_b1], opts), Tensor::randn([n2, dim_b2], opts))
}

fn zero_loss(a: &Tensor, _b: &Tensor) -> Tensor {
    Tensor::zeros([a.size()[0]], (Kind::Float, a.device()))
}

#[test]
fn parameter_groups_partition_all_trainable_variables() {
    for (dim_b1, dim_b2) in [(1, 1), (3, 5), (7, 2)] {
        let model = Magan::new(cpu_config(dim_b1, dim_b2), ZeroCorrespondence).unwrap();
        let groups = model.parameter_groups();

        let generator: HashSet<&String> = groups.generator.iter().collect();
        let discriminator: HashSet<&String> = groups.discriminator.iter().collect();
        assert!(generator.is_disjoint(&discriminator));
        assert_eq!(generator.len() + discriminator.len(), model.trainable_parameter_count());

        assert!(groups
            .generator
            .iter()
            .all(|name| name.starts_with("G12.") || name.starts_with("G21.")));
        assert!(groups
            .discriminator
            .iter()
            .all(|name| name.starts_with("D1.") || name.starts_with("D2.")));
        // 4 generator layers and 6 discriminator layers, weight + bias each
        assert_eq!(groups.generator.len(), 2 * 4 * 2);
        assert_eq!(groups.discriminator.len(), 2 * 6 * 2);
    }
}

#[test]
fn instances_do_not_share_parameters() {
    let a = Magan::new(cpu_config(2, 2), ZeroCorrespondence).unwrap();
    let b = Magan::new(cpu_config(2, 2), ZeroCorrespondence).unwrap();
    let xb1 = Tensor::randn([5, 2], (Kind::Float, Device::Cpu));
    let ya = a.generate_b2(&xb1).unwrap();
    let yb = b.generate_b2(&xb1).unwrap();
    assert!(!ya.allclose(&yb, 0.0, 0.0, false));
}

#[test]
fn generate_is_deterministic_and_matches_translation_layer() {
    let model = Magan::new(cpu_config(3, 4), ZeroCorrespondence).unwrap();
    let (xb1, xb2) = batches(6, 3, 6, 4);
    let first = model.generate_b2(&xb1).unwrap();
    let second = model.generate_b2(&xb1).unwrap();
    assert!(first.equal(&second));

    let layer = model.get_layer(&xb1, &xb2, "Gb2").unwrap();
    assert!(first.equal(&layer));

    // the reconstruction pass runs the same weights again
    let reconstructed = model.layer(&xb1, &xb2, Layer::Xb1Reconstructed).unwrap();
    let by_hand = model.generate_b1(&first).unwrap();
    assert!(reconstructed.equal(&by_hand));
}

#[test]
fn scenario_three_by_five_with_zero_correspondence() {
    let model = Magan::new(cpu_config(3, 5), zero_loss).unwrap();
    let (xb1, xb2) = batches(10, 3, 10, 5);

    assert_eq!(model.get_layer(&xb1, &xb2, "Gb2").unwrap().size(), vec![10, 5]);
    assert_eq!(model.get_layer(&xb1, &xb2, "Gb1").unwrap().size(), vec![10, 3]);
    assert_eq!(
        model.get_layer(&xb1, &xb2, "xb1_reconstructed").unwrap().size(),
        vec![10, 3]
    );
    assert_eq!(
        model.get_layer(&xb1, &xb2, "xb2_reconstructed").unwrap().size(),
        vec![10, 5]
    );

    let names = model.get_loss_names();
    assert!(names.contains('D'));
    assert!(names.contains('G'));
    assert_eq!(model.get_loss(&xb1, &xb2).unwrap().split(' ').count(), 2);
}

#[test]
fn layers_follow_each_batch_size() {
    let model = Magan::new(cpu_config(3, 5), ZeroCorrespondence).unwrap();
    let (xb1, xb2) = batches(7, 3, 4, 5);
    assert_eq!(model.layer(&xb1, &xb2, Layer::Gb2).unwrap().size(), vec![7, 5]);
    assert_eq!(model.layer(&xb1, &xb2, Layer::Gb1).unwrap().size(), vec![4, 3]);
    assert_eq!(
        model.layer(&xb1, &xb2, Layer::Xb2Reconstructed).unwrap().size(),
        vec![4, 5]
    );
}

#[test]
fn losses_are_finite_after_training() {
    let mut model = Magan::new(cpu_config(3, 5), zero_loss).unwrap();
    let (xb1, xb2) = batches(16, 3, 12, 5);
    model.train(&xb1, &xb2).unwrap();
    assert_eq!(model.iteration(), 1);

    for (kind, value) in model.loss_values(&xb1, &xb2).unwrap() {
        assert!(value.is_finite(), "{} loss is {}", kind, value);
    }
}

#[test]
fn get_loss_does_not_mutate_parameters() {
    let model = Magan::new(cpu_config(2, 2), IdentityCorrespondence).unwrap();
    let (xb1, xb2) = batches(8, 2, 8, 2);
    let first = model.get_loss(&xb1, &xb2).unwrap();
    let _ = model.get_layer(&xb1, &xb2, "Gb1").unwrap();
    let second = model.get_loss(&xb1, &xb2).unwrap();
    assert_eq!(first, second);
    assert_eq!(model.iteration(), 0);
}

#[test]
fn training_on_toy_rings_stays_bounded() {
    tch::manual_seed(0);
    let config = cpu_config(TOY_DIM, TOY_DIM).with_report_components(true);
    let mut model = Magan::new(config, IdentityCorrespondence).unwrap();
    let mut toy = ToyDomains::new(512, 0);
    let (eval_b1, eval_b2) = toy.minibatch(128, Device::Cpu);

    let initial = model.loss_values(&eval_b1, &eval_b2).unwrap();
    for _ in 0..500 {
        let (xb1, xb2) = toy.minibatch(32, Device::Cpu);
        model.train(&xb1, &xb2).unwrap();
    }
    assert_eq!(model.iteration(), 500);

    let last = model.loss_values(&eval_b1, &eval_b2).unwrap();
    for ((kind, before), (_, after)) in initial.iter().zip(last.iter()) {
        assert!(after.is_finite(), "{} loss diverged to {}", kind, after);
        assert!(*after < 100.0 + 10.0 * before, "{} loss grew from {} to {}", kind, before, after);
    }
}

#[test]
fn save_and_restore_preserve_losses() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Magan::new(cpu_config(3, 5), zero_loss).unwrap();
    let (xb1, xb2) = batches(10, 3, 10, 5);
    for _ in 0..3 {
        model.train(&xb1, &xb2).unwrap();
    }
    let before = model.loss_values(&xb1, &xb2).unwrap();
    let folder = model.save(None, dir.path().join("ckpt")).unwrap();

    let config = MaganConfig::restore(&folder).with_device(DeviceConfig::cpu());
    let restored = Magan::new(config, zero_loss).unwrap();
    assert_eq!(restored.iteration(), 3);
    assert_eq!((restored.dim_b1(), restored.dim_b2()), (3, 5));
    assert_eq!(restored.loss_values(&xb1, &xb2).unwrap(), before);
    assert_eq!(restored.get_loss(&xb1, &xb2).unwrap(), model.get_loss(&xb1, &xb2).unwrap());
}

#[test]
fn save_records_explicit_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let model = Magan::new(cpu_config(2, 2), ZeroCorrespondence).unwrap();
    model.save(Some(1234), dir.path()).unwrap();
    let restored = Magan::new(
        cpu_config(2, 2).with_restore_folder(dir.path()),
        ZeroCorrespondence,
    )
    .unwrap();
    assert_eq!(restored.iteration(), 1234);
}

#[test]
fn restore_rejects_missing_or_mismatched_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let missing = Magan::new(
        MaganConfig::restore(dir.path().join("nothing")).with_device(DeviceConfig::cpu()),
        ZeroCorrespondence,
    );
    assert!(matches!(missing, Err(MaganError::CheckpointMissing(_))));

    let model = Magan::new(cpu_config(3, 5), ZeroCorrespondence).unwrap();
    model.save(None, dir.path()).unwrap();
    let mismatched = Magan::new(
        cpu_config(4, 5).with_restore_folder(dir.path()),
        ZeroCorrespondence,
    );
    assert!(matches!(
        mismatched,
        Err(MaganError::CheckpointMismatch {
            field: "dim_b1",
            found: 3,
            configured: 4,
            ..
        })
    ));
}

#[test]
fn non_finite_correspondence_is_rejected() {
    let nan_loss = |a: &Tensor, _b: &Tensor| Tensor::full([a.size()[0]], f64::NAN, (Kind::Float, a.device()));
    let mut model = Magan::new(cpu_config(2, 2), nan_loss).unwrap();
    let (xb1, xb2) = batches(4, 2, 4, 2);
    assert!(matches!(
        model.train(&xb1, &xb2),
        Err(MaganError::NonFiniteCorrespondence)
    ));
    assert!(matches!(
        model.get_loss(&xb1, &xb2),
        Err(MaganError::NonFiniteCorrespondence)
    ));
}

#[test]
fn realness_is_a_probability_per_discriminator() {
    let mut model = Magan::new(cpu_config(3, 5), ZeroCorrespondence).unwrap();
    let (xb1, xb2) = batches(10, 3, 10, 5);
    model.train(&xb1, &xb2).unwrap();
    let realness = model.realness(&xb1, &xb2).unwrap();
    for p in [realness.d1_real, realness.d1_fake, realness.d2_real, realness.d2_fake] {
        assert!((0.0..=1.0).contains(&p), "realness {} outside [0, 1]", p);
    }
    assert_eq!(model.realness(&xb1, &xb2).unwrap(), realness);
    assert_eq!(model.iteration(), 1);
}

#[test]
fn correspondence_width_mismatch_is_an_error() {
    assert!(matches!(
        Magan::new(cpu_config(3, 5), IdentityCorrespondence),
        Err(MaganError::CorrespondenceDims { .. })
    ));
    assert!(matches!(
        Magan::new(cpu_config(2, 2), FeatureCorrespondence::new(&[(0, 2)])),
        Err(MaganError::CorrespondenceDims { .. })
    ));
}

#[test]
fn rejected_batch_leaves_iteration_unchanged() {
    let mut model = Magan::new(cpu_config(3, 5), ZeroCorrespondence).unwrap();
    let (xb1, xb2) = batches(4, 5, 4, 5);
    assert!(model.train(&xb1, &xb2).is_err());
    assert_eq!(model.iteration(), 0);
}
