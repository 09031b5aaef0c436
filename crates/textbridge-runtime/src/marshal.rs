//! String and sequence marshaling across the runtime boundary.
//!
//! Sequences are walked in fixed-size batches, one bounded frame per batch
//! (see [`FRAME_BATCH_SIZE`]), matching the runtime's limit on transient
//! handles per call context. Empty input maps to empty output with no
//! error; marshal failures are [`RuntimeError::MarshalFailed`], distinct
//! from foreign exceptions.

use std::sync::Arc;

use crate::error::RuntimeError;
use crate::frame::{FRAME_BATCH_SIZE, with_frame};
use crate::vm::{LocalHandle, VmInstance};

/// Marshal a sequence of strings into a runtime string array.
///
/// The array handle lands in the caller's frame; element handles live only
/// inside per-batch sub-frames, so at most [`FRAME_BATCH_SIZE`] of them are
/// alive at once.
pub fn marshal_string_seq(
    vm: &Arc<dyn VmInstance>,
    values: &[String],
) -> Result<LocalHandle, RuntimeError> {
    let array = vm.new_string_array(values.len())?;
    for (batch_index, batch) in values.chunks(FRAME_BATCH_SIZE).enumerate() {
        let offset = batch_index * FRAME_BATCH_SIZE;
        with_frame(vm, FRAME_BATCH_SIZE, |frame| {
            for (i, value) in batch.iter().enumerate() {
                let element = frame.new_string(value)?;
                vm.set_array_element(array, offset + i, element)?;
            }
            Ok(())
        })?;
    }
    Ok(array)
}

/// Unmarshal a runtime string array into owned strings, preserving order.
pub fn unmarshal_string_array(
    vm: &Arc<dyn VmInstance>,
    array: LocalHandle,
) -> Result<Vec<String>, RuntimeError> {
    let len = vm.array_len(array)?;
    let mut values = Vec::with_capacity(len);
    let mut start = 0;
    while start < len {
        let end = usize::min(start + FRAME_BATCH_SIZE, len);
        with_frame(vm, FRAME_BATCH_SIZE, |frame| {
            for i in start..end {
                let element = frame.get_array_element(array, i)?;
                values.push(vm.get_string(element)?);
            }
            Ok(())
        })?;
        start = end;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::VmConfig;
    use crate::inproc::InProcVm;

    fn attached_vm() -> (Arc<InProcVm>, Arc<dyn VmInstance>) {
        let vm = InProcVm::new(VmConfig::default());
        vm.attach_current_thread().unwrap();
        (vm.clone(), vm as Arc<dyn VmInstance>)
    }

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("word-{i}")).collect()
    }

    #[test]
    fn round_trip_preserves_content_and_order() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        for n in [0usize, 1, 32, 33, 1000] {
            let (_inproc, vm) = attached_vm();
            let input = words(n);
            let output = with_frame(&vm, 4, |_frame| {
                let array = marshal_string_seq(&vm, &input)?;
                unmarshal_string_array(&vm, array)
            })
            .unwrap();
            assert_eq!(output, input, "round trip of {n} values");
        }
    }

    #[test]
    fn hundred_elements_use_four_batches_bounded_by_capacity() {
        let (inproc, vm) = attached_vm();
        let input = words(100);

        let array = marshal_string_seq(&vm, &input).unwrap();
        let marshal_frames = inproc.frames_opened();
        assert_eq!(marshal_frames, 4);

        let output = unmarshal_string_array(&vm, array).unwrap();
        assert_eq!(inproc.frames_opened() - marshal_frames, 4);
        assert_eq!(output.len(), 100);
        assert!(inproc.peak_frame_occupancy() <= FRAME_BATCH_SIZE);
    }

    #[test]
    fn empty_sequence_is_empty_output_not_an_error() {
        let (_inproc, vm) = attached_vm();
        let array = marshal_string_seq(&vm, &[]).unwrap();
        let output = unmarshal_string_array(&vm, array).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn unmarshal_of_a_non_array_handle_is_a_marshal_error() {
        let (_inproc, vm) = attached_vm();
        let not_array = vm.new_string("just a string").unwrap();
        assert!(matches!(
            unmarshal_string_array(&vm, not_array),
            Err(RuntimeError::MarshalFailed(_))
        ));
    }

    #[test]
    fn failed_unmarshal_leaks_no_frame_handles() {
        let (_inproc, vm) = attached_vm();
        let array = vm.new_string_array(3).unwrap(); // elements left unset
        let before = vm.live_local_handles();
        assert!(unmarshal_string_array(&vm, array).is_err());
        assert_eq!(vm.live_local_handles(), before);
    }
}
