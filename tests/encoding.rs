use kram::consts::*;
use kram::encoder;
use kram::prelude::*;

#[test]
fn mov_imm32_reference_encoding_and_execution() {
    let inst = encoder::mov_ri(DataSize::DoubleWord, 1, 0x1234_5678);
    assert_eq!(inst.to_bytes(), vec![0x0b, 0x01, 0x78, 0x56, 0x34, 0x12]);

    let mut vm = Interpreter::bare();
    vm.execute(&inst).unwrap();
    assert_eq!(vm.register(1) as u32, 0x1234_5678);
}

#[test]
fn mov_register_into_stack_reference_encoding_and_execution() {
    let dst = MemoryLocation::stack().with_delta(5);
    let inst = encoder::mov_mr(DataSize::Byte, &dst, 2);

    // operand header: segment=stack, delta present, byte-wide delta
    let bytes = inst.to_bytes();
    assert_eq!(bytes[2], 0x21);
    assert_eq!(bytes[1] & 0x0f, 2);

    let mut vm = Interpreter::bare();
    vm.set_register(2, 0xab);
    assert_eq!(vm.register(REG_SB), 0);

    vm.execute(&inst).unwrap();
    assert_eq!(vm.stack().bytes()[5], 0xab);
}

#[test]
fn write_cap_bounds_every_instruction() {
    let loc = MemoryLocation::register(6)
        .with_split(2, DataSize::DoubleWord)
        .with_delta(0x1234);
    let instructions = vec![
        encoder::nop(),
        encoder::mov_rr(DataSize::Byte, 1, 2),
        encoder::mov_mi(DataSize::QuadWord, &loc, u64::MAX),
        encoder::lea(5, &loc),
        encoder::new_m(true, &loc, 0x100),
        encoder::callc(1, 2),
    ];

    for inst in instructions {
        assert_eq!(inst.byte_count(), 1 + inst.args().len());

        for cap in 0..=inst.byte_count() + 2 {
            let mut buf = vec![0u8; cap];
            let written = inst.write(&mut buf);
            assert_eq!(written, cap.min(inst.byte_count()));
            assert_eq!(&buf[..written], &inst.to_bytes()[..written]);
        }
    }
}

#[test]
fn builder_splice_keeps_order_and_size() {
    let mut a = InstructionBuilder::new();
    a.push_back(encoder::nop());
    a.push_back(encoder::mov_rr(DataSize::QuadWord, 0, 1));

    let mut b = InstructionBuilder::new();
    b.push_back(encoder::lea(2, &MemoryLocation::stack()));

    let total = a.len() + b.len();
    a.append(&mut b);

    assert_eq!(a.len(), total);
    assert_eq!(a.len(), 3);
    assert!(b.is_empty());

    let opcodes: Vec<Opcode> = a.iter().map(Instruction::opcode).collect();
    assert_eq!(opcodes, vec![Opcode::Nop, Opcode::MovR64R64, Opcode::Lea]);
}

#[test]
fn serialized_builder_parses_back_to_the_same_sequence() {
    let mut builder = InstructionBuilder::new();
    builder.push_back(encoder::mov_ri(DataSize::Word, 3, 0xbeef));
    builder.push_back(encoder::mmb(DataSize::Byte, 1, 2, 0x40));
    builder.push_back(encoder::new_r(false, 0, 0x10000));
    builder.push_back(encoder::cst_m(
        DataType::Float,
        DataType::SignedQuadWord,
        &MemoryLocation::static_data().with_delta(8),
    ));
    builder.push_back(encoder::ret());

    let mut image = vec![0u8; builder.byte_count()];
    assert_eq!(builder.build(&mut image), image.len());

    let mut parsed = Vec::new();
    let mut pos = 0;
    while pos < image.len() {
        let (inst, len) = Instruction::parse(&image[pos..]).unwrap();
        parsed.push(inst);
        pos += len;
    }

    let original: Vec<Instruction> = builder.iter().cloned().collect();
    assert_eq!(parsed, original);
}

#[test]
fn chunk_reader_walk_matches_builder_inputs() {
    let mut leaf = ChunkBuilder::new();
    let mut f = FunctionBuilder::new();
    f.set_code([encoder::ret()].into_iter().collect());
    leaf.add_function(f);

    let mut program = Program::new();
    let leaf = program.add_chunk(leaf.build().unwrap()).unwrap();

    let mut root = ChunkBuilder::new();
    root.add_connection(leaf);
    root.add_static(32);
    root.add_static(8);

    let mut first = FunctionBuilder::new();
    first.set_parameters(8).set_stack_size(64);
    first.set_code(
        [encoder::mov_ri(DataSize::QuadWord, 0, 1), encoder::ret()]
            .into_iter()
            .collect(),
    );
    let first_code = first.code().byte_count();

    let mut second = FunctionBuilder::new();
    second.set_code([encoder::nop()].into_iter().collect());

    root.add_function(first);
    root.add_function(second);

    let chunk = root.build().unwrap();
    assert_eq!(chunk.connection_count(), 1);
    assert_eq!(chunk.static_count(), 40);
    assert_eq!(chunk.function_count(), 2);
    assert_eq!(chunk.code_count(), first_code + 1);

    assert_eq!(chunk.connection(0), Some(leaf));
    assert_eq!(
        chunk.function(0),
        Some(FunctionEntry {
            parameter_count: 8,
            stack_count: 64,
            code_offset: 0
        })
    );
    assert_eq!(chunk.function(1).unwrap().code_offset as usize, first_code);

    // the code region is the concatenation of the function bodies
    assert_eq!(chunk.code()[0], Opcode::MovR64Imm64.as_u8());
    assert_eq!(chunk.code()[first_code], Opcode::Nop.as_u8());
}
