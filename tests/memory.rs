use kram::consts::*;
use kram::encoder;
use kram::prelude::*;

fn vm_with_statics(size: usize) -> Interpreter {
    let mut builder = ChunkBuilder::new();
    builder.add_static(size);
    let mut program = Program::new();
    program.add_chunk(builder.build().unwrap()).unwrap();
    Interpreter::new(program)
}

#[test]
fn new_then_release_then_sweep_leaves_no_live_blocks() {
    let mut vm = Interpreter::bare();

    vm.execute(&encoder::new_r(true, 0, 16)).unwrap();
    let address = vm.register(0);
    assert_ne!(address, 0);
    assert_eq!(vm.heap().block_count(), 1);

    vm.execute(&encoder::mhr_r(false, 0)).unwrap();
    vm.heap_mut().garbage_collector();

    assert_eq!(vm.heap().block_count(), 0);
    // the register still holds the now dangling address
    assert_eq!(vm.register(0), address);
}

#[test]
fn new_and_del_restore_heap_accounting() {
    let mut vm = Interpreter::bare();
    let blocks = vm.heap().block_count();
    let used = vm.heap().used_bytes();

    vm.execute(&encoder::new_r(true, 0, 64)).unwrap();
    assert_eq!(vm.heap().block_count(), blocks + 1);

    vm.execute(&encoder::del_r(0)).unwrap();
    assert_eq!(vm.heap().block_count(), blocks);
    assert_eq!(vm.heap().used_bytes(), used);
}

#[test]
fn sweep_frees_exactly_the_zero_ref_blocks() {
    let mut vm = Interpreter::bare();

    vm.execute(&encoder::new_r(true, 0, 8)).unwrap();
    vm.execute(&encoder::new_r(false, 1, 8)).unwrap();
    vm.execute(&encoder::new_r(true, 2, 8)).unwrap();

    // r2's block gains a second reference, then loses both
    vm.execute(&encoder::mhr_r(true, 2)).unwrap();
    vm.execute(&encoder::mhr_r(false, 2)).unwrap();
    vm.execute(&encoder::mhr_r(false, 2)).unwrap();

    vm.heap_mut().garbage_collector();

    // r0 alive, r1 and r2 swept
    assert_eq!(vm.heap().block_count(), 1);
    let payload = (vm.register(0) & REGION_OFFSET_MASK) as usize;
    assert_eq!(vm.heap().refs_of(payload).unwrap(), 1);
}

#[test]
fn lea_of_static_delta_yields_base_plus_offset() {
    let mut vm = vm_with_statics(0x200);
    vm.set_register(REG_CH, 0);

    let src = MemoryLocation::static_data().with_delta(0x100);
    vm.execute(&encoder::lea(3, &src)).unwrap();

    assert_eq!(vm.register(3), vm.statics_base(0) + 0x100);
}

#[test]
fn statics_are_writable_through_the_current_chunk() {
    let mut vm = vm_with_statics(16);
    vm.set_register(REG_CH, 0);

    let slot = MemoryLocation::static_data().with_delta(4);
    vm.execute(&encoder::mov_mi(DataSize::DoubleWord, &slot, 0xdead_beef))
        .unwrap();
    vm.execute(&encoder::mov_rm(DataSize::DoubleWord, 7, &slot))
        .unwrap();

    assert_eq!(vm.register(7) as u32, 0xdead_beef);
    assert_eq!(
        vm.program().chunk(0).unwrap().statics()[4..8],
        [0xef, 0xbe, 0xad, 0xde]
    );
}

#[test]
fn cst_double_to_signed_truncates_toward_zero() {
    let mut vm = Interpreter::bare();

    vm.set_register(4, 3.7f64.to_bits());
    vm.execute(&encoder::cst_r(DataType::SignedDoubleWord, DataType::Double, 4))
        .unwrap();
    assert_eq!(vm.register(4) as u32 as i32, 3);

    vm.set_register(4, (-3.7f64).to_bits());
    vm.execute(&encoder::cst_r(DataType::SignedDoubleWord, DataType::Double, 4))
        .unwrap();
    assert_eq!(vm.register(4) as u32 as i32, -3);
}

#[test]
fn cst_on_memory_reads_src_width_and_writes_dst_width() {
    let mut vm = Interpreter::bare();

    let slot = MemoryLocation::stack().with_delta(8);
    vm.execute(&encoder::mov_mi(DataSize::QuadWord, &slot, 2.5f64.to_bits()))
        .unwrap();
    vm.execute(&encoder::cst_m(
        DataType::UnsignedByte,
        DataType::Double,
        &slot,
    ))
    .unwrap();

    assert_eq!(vm.stack().bytes()[8], 2);
}

#[test]
fn mmb_copies_between_heap_blocks() {
    let mut vm = Interpreter::bare();

    vm.execute(&encoder::new_r(true, 0, 16)).unwrap();
    vm.execute(&encoder::new_r(true, 1, 16)).unwrap();

    let src_slot = MemoryLocation::register(0);
    vm.execute(&encoder::mov_mi(
        DataSize::QuadWord,
        &src_slot,
        0x0102_0304_0506_0708,
    ))
    .unwrap();
    vm.execute(&encoder::mov_mi(
        DataSize::QuadWord,
        &src_slot.with_delta(8),
        0x1112_1314_1516_1718,
    ))
    .unwrap();

    vm.execute(&encoder::mmb(DataSize::Byte, 1, 0, 16)).unwrap();

    let dst_slot = MemoryLocation::register(1);
    vm.execute(&encoder::mov_rm(DataSize::QuadWord, 5, &dst_slot))
        .unwrap();
    vm.execute(&encoder::mov_rm(DataSize::QuadWord, 6, &dst_slot.with_delta(8)))
        .unwrap();

    assert_eq!(vm.register(5), 0x0102_0304_0506_0708);
    assert_eq!(vm.register(6), 0x1112_1314_1516_1718);
}

#[test]
fn mov_mem_to_mem_uses_two_locations() {
    let mut vm = Interpreter::bare();

    let src = MemoryLocation::stack().with_delta(0x10);
    let dst = MemoryLocation::stack().with_delta(0x20);

    vm.execute(&encoder::mov_mi(DataSize::Word, &src, 0xcafe)).unwrap();
    vm.execute(&encoder::mov_mm(DataSize::Word, &dst, &src)).unwrap();

    assert_eq!(vm.stack().bytes()[0x20..0x22], [0xfe, 0xca]);
}

#[test]
fn heap_exhaustion_is_recoverable_in_band() {
    let mut vm = Interpreter::with_config(Program::new(), 4096, 128);

    vm.execute(&encoder::new_r(true, 0, 4096)).unwrap();

    assert_eq!(vm.register(0), 0);
    assert_eq!(vm.error_code(), ErrorCode::HeapOverflow);
    assert_eq!(vm.register(REG_SR), ErrorCode::HeapOverflow as u64);
    assert!(!vm.exited());

    // execution continues; a fitting allocation still succeeds
    vm.execute(&encoder::new_r(true, 1, 16)).unwrap();
    assert_ne!(vm.register(1), 0);
}

#[test]
fn del_through_a_memory_operand() {
    let mut vm = Interpreter::bare();

    vm.execute(&encoder::new_r(true, 0, 8)).unwrap();
    let slot = MemoryLocation::stack().with_delta(0x40);
    vm.execute(&encoder::mov_mr(DataSize::QuadWord, &slot, 0)).unwrap();

    vm.execute(&encoder::del_m(&slot)).unwrap();
    assert_eq!(vm.heap().block_count(), 0);
}

#[test]
fn del_of_a_non_heap_pointer_faults() {
    let mut vm = Interpreter::bare();
    vm.set_register(0, 0x1234);

    let result = vm.execute(&encoder::del_r(0));
    assert!(matches!(
        result,
        Err(VmError::Fault(Fault::BadHeapPointer))
    ));
    assert_eq!(vm.fault(), Some(Fault::BadHeapPointer));
}

#[test]
fn out_of_bounds_store_faults() {
    let mut vm = Interpreter::with_config(Program::new(), 64, 64);

    let far = MemoryLocation::stack().with_delta(0x1000);
    let result = vm.execute(&encoder::mov_mi(DataSize::Byte, &far, 1));
    assert!(matches!(
        result,
        Err(VmError::Fault(Fault::MemoryOverflow))
    ));
}
