#![no_main]

use libfuzzer_sys::fuzz_target;
use runsight_core::error::DecodeError;
use runsight_engine::decode;
use runsight_engine::runsight_ebpf_common::EVENT_SIZE;

fuzz_target!(|data: &[u8]| {
    // 짧은 버퍼는 범위 밖 읽기 없이 TooShort, 나머지는 항상 성공해야 한다
    match decode(data) {
        Ok(event) => {
            assert!(data.len() >= EVENT_SIZE);
            let _ = event.comm.to_string_lossy();
            let _ = event.filename.to_string_lossy();
            let _ = event.destination();
        }
        Err(DecodeError::TooShort { len, expected }) => {
            assert_eq!(len, data.len());
            assert_eq!(expected, EVENT_SIZE);
        }
    }
});
