// 该文件是 Mailuo （脉络） 项目的一部分。
// tests/postprocess.rs - 检测后处理的性质测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Mailuo Contributors

mod common;

use mailuo::{
  config::DetectionParameters,
  postprocess::{DetectionPostProcessor, filter_and_deduplicate},
};

use common::{detection, scattered_detections};

#[test]
fn suppression_scenario() {
  let processor = DetectionPostProcessor::new(DetectionParameters::default());
  let out = processor.process(vec![
    detection(10.0, 10.0, 20.0, 20.0, 0.9),
    detection(12.0, 12.0, 20.0, 20.0, 0.8),
  ]);
  assert_eq!(out, vec![detection(10.0, 10.0, 20.0, 20.0, 0.9)]);
}

#[test]
fn nms_is_idempotent() {
  for seed in 1..6 {
    let once = filter_and_deduplicate(scattered_detections(60, seed), 0.3, 0.4);
    let twice = filter_and_deduplicate(once.clone(), 0.3, 0.4);
    assert_eq!(once, twice);
  }
}

#[test]
fn output_never_grows_and_respects_gate() {
  for seed in 10..16 {
    let input = scattered_detections(80, seed);
    let out = filter_and_deduplicate(input.clone(), 0.5, 0.4);
    assert!(out.len() <= input.len());
    assert!(out.iter().all(|d| d.confidence >= 0.5));
  }
}

#[test]
fn survivors_do_not_overlap_beyond_threshold() {
  let out = filter_and_deduplicate(scattered_detections(100, 42), 0.0, 0.4);
  for (i, a) in out.iter().enumerate() {
    for b in &out[i + 1..] {
      assert!(a.bbox.iou(&b.bbox) < 0.4);
    }
  }
  assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn iou_threshold_one_only_removes_exact_duplicates() {
  let out = filter_and_deduplicate(
    vec![
      detection(0.0, 0.0, 10.0, 10.0, 0.9),
      detection(0.0, 0.0, 10.0, 10.0, 0.8),
      detection(1.0, 0.0, 10.0, 10.0, 0.7),
    ],
    0.0,
    1.0,
  );
  assert_eq!(out.len(), 2);
}
