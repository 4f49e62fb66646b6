use kram::consts::*;
use kram::encoder;
use kram::instruction::Instruction;
use kram::prelude::*;

fn function(parameters: u64, stack_size: u64, code: Vec<Instruction>) -> FunctionBuilder {
    let mut builder = FunctionBuilder::new();
    builder.set_parameters(parameters).set_stack_size(stack_size);
    builder.set_code(code.into_iter().collect());
    builder
}

fn single_chunk(functions: Vec<FunctionBuilder>) -> Program {
    let mut builder = ChunkBuilder::new();
    for f in functions {
        builder.add_function(f);
    }
    let mut program = Program::new();
    program.add_chunk(builder.build().unwrap()).unwrap();
    program
}

#[test]
fn entry_return_carries_sr() {
    let program = single_chunk(vec![function(
        0,
        0,
        vec![
            encoder::mov_ri(DataSize::QuadWord, REG_SR, 42),
            encoder::ret(),
        ],
    )]);

    let mut vm = Interpreter::new(program);
    assert_eq!(vm.run(0, 0, &[]).unwrap(), 42);
    assert!(vm.exited());
    assert_eq!(vm.error_code(), ErrorCode::Ok);
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn running_off_the_code_end_terminates_the_loop() {
    let program = single_chunk(vec![function(
        0,
        0,
        vec![
            encoder::mov_ri(DataSize::QuadWord, REG_SR, 7),
            encoder::nop(),
        ],
    )]);

    let mut vm = Interpreter::new(program);
    assert_eq!(vm.run(0, 0, &[]).unwrap(), 7);
    assert!(vm.exited());
}

#[test]
fn entry_parameters_arrive_in_the_parameter_area() {
    // sp marks the start of the parameter area; with no locals it equals sb
    let program = single_chunk(vec![function(
        8,
        0,
        vec![
            encoder::mov_rm(DataSize::QuadWord, 0, &MemoryLocation::stack()),
            encoder::mov_rr(DataSize::QuadWord, REG_SR, 0),
            encoder::ret(),
        ],
    )]);

    let mut vm = Interpreter::new(program);
    let params = 0xfeed_f00d_dead_beefu64.to_le_bytes();
    assert_eq!(vm.run(0, 0, &params).unwrap(), 0xfeed_f00d_dead_beef);
}

#[test]
fn call_passes_parameters_and_ret_restores_the_image() {
    // function 1: returns its single 8-byte parameter through sr and
    // clobbers r5 on the way
    let callee = function(
        8,
        0,
        vec![
            encoder::mov_rm(DataSize::QuadWord, 0, &MemoryLocation::stack()),
            encoder::mov_rr(DataSize::QuadWord, REG_SR, 0),
            encoder::mov_ri(DataSize::QuadWord, 5, 0xbbbb),
            encoder::ret(),
        ],
    );

    // entry: seeds r5, stages 0x2a at its stack top, bumps st and calls;
    // afterwards it parks the callee's sr in its locals and returns the
    // restored r5 instead
    let entry = function(
        0,
        16,
        vec![
            encoder::mov_ri(DataSize::QuadWord, 5, 0xaaaa),
            encoder::mov_mi(
                DataSize::QuadWord,
                &MemoryLocation::stack().with_delta(16),
                0x2a,
            ),
            encoder::lea(REG_ST, &MemoryLocation::register(REG_ST).with_delta(8)),
            encoder::call(1),
            encoder::mov_mr(DataSize::QuadWord, &MemoryLocation::stack(), REG_SR),
            encoder::mov_rr(DataSize::QuadWord, REG_SR, 5),
            encoder::ret(),
        ],
    );

    let program = single_chunk(vec![entry, callee]);
    let mut vm = Interpreter::new(program);

    // r5 was restored across the call, so it survives as the return value
    assert_eq!(vm.run(0, 0, &[]).unwrap(), 0xaaaa);

    // the callee's sr reached the caller: it was parked in the entry
    // frame's locals, which start right above the 128-byte register image
    let locals = &vm.stack().bytes()[128..136];
    assert_eq!(locals, &0x2au64.to_le_bytes());
}

#[test]
fn callc_reaches_functions_of_connected_chunks() {
    let mut leaf = ChunkBuilder::new();
    leaf.add_function({
        let mut f = FunctionBuilder::new();
        f.set_code(
            [
                encoder::mov_ri(DataSize::QuadWord, REG_SR, 7),
                encoder::ret(),
            ]
            .into_iter()
            .collect(),
        );
        f
    });

    let mut program = Program::new();
    let leaf = program.add_chunk(leaf.build().unwrap()).unwrap();

    let mut root = ChunkBuilder::new();
    root.add_connection(leaf);
    root.add_function({
        let mut f = FunctionBuilder::new();
        f.set_code(
            [encoder::callc(0, 0), encoder::ret()]
                .into_iter()
                .collect(),
        );
        f
    });
    let root = program.add_chunk(root.build().unwrap()).unwrap();

    let mut vm = Interpreter::new(program);
    assert_eq!(vm.run(root, 0, &[]).unwrap(), 7);
}

#[test]
fn frame_establishment_grows_the_stack_preserving_contents() {
    // a tiny stack forces a resize when the callee's frame is built
    let callee = function(
        0,
        1024,
        vec![
            encoder::mov_ri(DataSize::QuadWord, REG_SR, 1),
            encoder::ret(),
        ],
    );
    let entry = function(
        0,
        8,
        vec![
            // a marker in the entry frame's locals, below the callee frame
            encoder::mov_mi(
                DataSize::QuadWord,
                &MemoryLocation::stack(),
                0x1122_3344_5566_7788,
            ),
            encoder::call(1),
            // return the marker read back after the callee grew the stack
            encoder::mov_rm(DataSize::QuadWord, 3, &MemoryLocation::stack()),
            encoder::mov_rr(DataSize::QuadWord, REG_SR, 3),
            encoder::ret(),
        ],
    );

    let program = single_chunk(vec![entry, callee]);
    let mut vm = Interpreter::with_config(program, 256, 1024);

    assert_eq!(vm.run(0, 0, &[]).unwrap(), 0x1122_3344_5566_7788);
    assert!(vm.stack().len() > 256);
}

#[test]
fn unbounded_recursion_faults_the_call_stack() {
    let program = single_chunk(vec![function(0, 0, vec![encoder::call(0)])]);

    let mut vm = Interpreter::new(program);
    let result = vm.run(0, 0, &[]);

    assert!(matches!(
        result,
        Err(VmError::Fault(Fault::CallStackOverflow))
    ));
    assert_eq!(vm.fault(), Some(Fault::CallStackOverflow));
    assert!(vm.exited());
}

#[test]
fn missing_parameters_fault_the_frame_build() {
    // the callee wants 8 parameter bytes but the entry stack top is empty
    let callee = function(8, 0, vec![encoder::ret()]);
    let entry = function(0, 0, vec![encoder::call(1), encoder::ret()]);

    let program = single_chunk(vec![entry, callee]);
    let mut vm = Interpreter::new(program);

    // entry frame starts at st = 0, so its own call already has no bytes
    let result = vm.run(0, 1, &[]);
    assert!(matches!(result, Err(VmError::Fault(Fault::StackUnderflow))));
}

#[test]
fn unknown_entry_points_are_rejected() {
    let program = single_chunk(vec![function(0, 0, vec![encoder::ret()])]);
    let mut vm = Interpreter::new(program);

    assert!(matches!(
        vm.run(0, 9, &[]),
        Err(VmError::EntryNotFound { chunk: 0, function: 9 })
    ));
    assert!(matches!(
        vm.run(3, 0, &[]),
        Err(VmError::EntryNotFound { chunk: 3, function: 0 })
    ));
}

#[test]
fn decode_errors_are_typed() {
    assert!(matches!(
        Instruction::parse(&[0xff]),
        Err(Fault::UnknownOpcode(0xff))
    ));

    // truncated operands fault the same way at the decode layer
    assert!(matches!(
        Instruction::parse(&[Opcode::MovR64Imm64.as_u8(), 0x00, 0x01]),
        Err(Fault::TruncatedOperand)
    ));
}

#[test]
fn execute_outside_a_frame_underflows_on_ret() {
    let mut vm = Interpreter::bare();
    let result = vm.execute(&encoder::ret());
    assert!(matches!(
        result,
        Err(VmError::Fault(Fault::CallStackUnderflow))
    ));
}
