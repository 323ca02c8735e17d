//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（无需硬件）：config -> coordinator -> worker -> sample buffer

#[cfg(test)]
mod contract_tests {
    use contracts::{ProbeAddress, ProbeGeneration};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_stream_fan_out_per_generation() {
        let address = ProbeAddress::new(2, 1, 1);
        for (generation, streams) in [
            (ProbeGeneration::Np1, 1),
            (ProbeGeneration::Np2, 1),
            (ProbeGeneration::QuadBase, 4),
        ] {
            let caps = generation.capabilities();
            assert_eq!(address.streams(caps.shank_streams).len(), streams);
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use acquisition::StreamReaders;
    use basestation::{CoordinatorOptions, StreamCoordinator};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{AcquisitionBlueprint, DeviceAdapter};
    use device::{SimulatedAdapter, SimulationConfig, TimestampJumpInjection};
    use observability::BroadcastLog;
    use sample_buffer::FrameBlock;

    struct Rig {
        adapter: Arc<SimulatedAdapter>,
        broadcast: Arc<BroadcastLog>,
        coordinator: StreamCoordinator,
    }

    fn rig(toml: &str, simulation: SimulationConfig) -> Rig {
        let blueprint = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        rig_from(&blueprint, simulation)
    }

    fn rig_from(blueprint: &AcquisitionBlueprint, simulation: SimulationConfig) -> Rig {
        let adapter = Arc::new(SimulatedAdapter::new(simulation));
        let basestation = &blueprint.basestations[0];
        for probe in &basestation.probes {
            adapter.attach_probe(probe.address(basestation.slot), probe.generation);
        }
        let broadcast = Arc::new(BroadcastLog::default());
        let coordinator = StreamCoordinator::from_config(
            basestation,
            adapter.clone(),
            broadcast.clone(),
            CoordinatorOptions::from_blueprint(blueprint),
        )
        .unwrap();

        Rig {
            adapter,
            broadcast,
            coordinator,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn drain(readers: &mut StreamReaders, channels: usize, frames: usize) -> FrameBlock {
        let mut block = FrameBlock::new(channels, frames);
        let read = readers.ap.read_all_from_buffer(&mut block, frames);
        assert_eq!(read, block.len());
        block
    }

    const SINGLE_NP1: &str = r#"
[acquisition.timing]
startup_grace_samples = 100

[[basestations]]
slot = 3

[[basestations.probes]]
port = 1
generation = "np1"
"#;

    /// 时间戳跳变只告警，sample number 仍然逐一递增
    #[test]
    fn test_sample_numbers_dense_across_timestamp_jump() {
        let simulation = SimulationConfig {
            timestamp_jumps: vec![TimestampJumpInjection {
                stream: None,
                at_frame: 1200,
                extra_ticks: 50,
            }],
            ..SimulationConfig::finite(2400, 20)
        };
        let mut rig = rig(SINGLE_NP1, simulation);
        rig.coordinator.initialize(false).unwrap();
        let mut readers = rig.coordinator.take_readers();
        assert_eq!(readers.len(), 1);

        assert_eq!(rig.coordinator.start_acquisition().unwrap(), 1);
        wait_until(|| readers[0].ap.available() == 2400);
        rig.coordinator.stop_acquisition();

        let block = drain(&mut readers[0], 384, 4096);
        assert_eq!(block.len(), 2400);
        for (i, n) in block.sample_numbers().iter().enumerate() {
            assert_eq!(*n, i as i64);
        }

        assert_eq!(rig.broadcast.count_containing("NPX TIMESTAMP JUMP"), 1);
        assert!(rig
            .broadcast
            .recent()
            .iter()
            .any(|m| m.ends_with("slot 3, probe 1 at sample number 1200")));
    }

    /// 无 jump 注入时不应有任何告警
    #[test]
    fn test_nominal_timestamps_raise_no_warning() {
        let mut rig = rig(SINGLE_NP1, SimulationConfig::finite(2400, 20));
        rig.coordinator.initialize(false).unwrap();
        let readers = rig.coordinator.take_readers();
        rig.coordinator.start_acquisition().unwrap();
        wait_until(|| readers[0].ap.available() == 2400);
        rig.coordinator.stop_acquisition();

        assert_eq!(rig.broadcast.count_containing("NPX TIMESTAMP JUMP"), 0);
    }

    #[test]
    fn test_drop_newest_refuses_when_consumer_stalls() {
        let toml = r#"
[acquisition]
buffer_capacity = 800
drop_policy = "drop_newest"

[[basestations]]
slot = 2

[[basestations.probes]]
port = 1
generation = "np2"
"#;
        let mut rig = rig(toml, SimulationConfig::finite(2000, 10));
        rig.coordinator.initialize(false).unwrap();
        let mut readers = rig.coordinator.take_readers();
        rig.coordinator.start_acquisition().unwrap();

        wait_until(|| rig.adapter.frames_produced(readers[0].stream) == 2000);
        wait_until(|| readers[0].ap.buffer().stats().frames_refused == 1200);
        rig.coordinator.stop_acquisition();

        let stats = readers[0].ap.buffer().stats();
        assert_eq!(stats.frames_written, 800);
        assert_eq!(stats.frames_overwritten, 0);

        // 保留的是最早的 800 帧
        let block = drain(&mut readers[0], 384, 1000);
        assert_eq!(block.len(), 800);
        assert_eq!(block.sample_numbers()[0], 0);
        assert_eq!(block.sample_numbers()[799], 799);
    }

    /// buffer 放不下一次读取时，配置在加载阶段就被拒绝
    #[test]
    fn test_buffer_smaller_than_one_read_rejected() {
        let toml = r#"
[acquisition]
buffer_capacity = 500

[[basestations]]
slot = 2

[[basestations.probes]]
port = 1
generation = "np2"
"#;
        let err = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("buffer_capacity"), "got: {err}");
    }

    #[test]
    fn test_initialize_twice_skips_hardware_setup() {
        let mut rig = rig(SINGLE_NP1, SimulationConfig::default());
        rig.coordinator.initialize(true).unwrap();
        let first = rig.adapter.calls();
        let report = rig.coordinator.initialize(true).unwrap();
        let second = rig.adapter.calls();

        assert!(!report.performed_setup);
        assert_eq!(first.configuration_calls(), second.configuration_calls());
        assert_eq!(second.init, 1);
        assert_eq!(second.arm, 2);
    }

    #[test]
    fn test_quad_base_streams_share_one_trigger() {
        let toml = r#"
[[basestations]]
slot = 4

[[basestations.probes]]
port = 2
generation = "quad_base"
"#;
        let mut rig = rig(toml, SimulationConfig::finite(600, 30));
        rig.coordinator.initialize(false).unwrap();
        let mut readers = rig.coordinator.take_readers();
        assert_eq!(readers.len(), 4);

        assert_eq!(rig.coordinator.start_acquisition().unwrap(), 4);
        wait_until(|| readers.iter().all(|r| r.ap.available() == 600));
        rig.coordinator.stop_acquisition();
        assert_eq!(rig.adapter.calls().set_sw_trigger, 1);

        for (shank, r) in readers.iter_mut().enumerate() {
            assert_eq!(r.stream.shank, Some(shank as u8));
            assert!(r.lfp.is_none());
            let block = drain(r, 384, 1000);
            assert_eq!(block.sample_numbers().last(), Some(&599));
        }
    }

    #[test]
    fn test_missing_calibration_reported_once_per_session() {
        let toml = r#"
[[basestations]]
slot = 2

[[basestations.probes]]
port = 1
generation = "np1"

[[basestations.probes]]
port = 2
generation = "np2"
"#;
        let mut rig = rig(toml, SimulationConfig::finite(100, 10));
        rig.coordinator.initialize(false).unwrap();
        rig.coordinator.initialize(false).unwrap();
        rig.coordinator.start_acquisition().unwrap();
        rig.coordinator.stop_acquisition();
        rig.coordinator.initialize(false).unwrap();

        assert_eq!(rig.broadcast.count_containing("Missing calibration files"), 1);
    }

    #[test]
    fn test_calibration_found_suppresses_warning() {
        let root = tempfile::tempdir().unwrap();
        let mut blueprint = ConfigLoader::load_from_str(SINGLE_NP1, ConfigFormat::Toml).unwrap();
        blueprint.calibration_dirs = vec![root.path().to_path_buf()];

        let probe = blueprint.basestations[0].probes[0].address(3);
        let adapter = SimulatedAdapter::with_probes(
            SimulationConfig::default(),
            [(probe, blueprint.basestations[0].probes[0].generation)],
        );
        adapter.open_probe(probe).unwrap();
        let serial = adapter.probe_serial_number(probe).unwrap();
        drop(adapter);

        let dir = root.path().join(serial.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{serial}_ADCCalibration.csv")), "0\n").unwrap();
        std::fs::write(dir.join(format!("{serial}_gainCalValues.csv")), "1\n").unwrap();

        let mut rig = rig_from(&blueprint, SimulationConfig::default());
        let report = rig.coordinator.initialize(false).unwrap();
        assert!(report.calibration[0].1.is_calibrated());
        assert_eq!(rig.adapter.calls().set_adc_calibration, 1);
        assert_eq!(rig.adapter.calls().set_gain_calibration, 1);
        assert_eq!(rig.broadcast.total_messages(), 0);
    }

    /// 停止后重新启动：新的 run 从 sample number 0 开始
    #[test]
    fn test_restart_resets_sample_numbers() {
        let mut rig = rig(SINGLE_NP1, SimulationConfig::finite(360, 10));
        rig.coordinator.initialize(false).unwrap();
        let mut readers = rig.coordinator.take_readers();

        for _ in 0..2 {
            rig.coordinator.start_acquisition().unwrap();
            wait_until(|| readers[0].ap.available() == 360);
            rig.coordinator.stop_acquisition();

            let block = drain(&mut readers[0], 384, 1000);
            assert_eq!(block.sample_numbers()[0], 0);
            assert_eq!(block.sample_numbers()[359], 359);
        }
        assert_eq!(rig.adapter.calls().set_sw_trigger, 2);
    }
}
