//! DAG-based instruction selection for AArch64.
//!
//! This path first builds the selection DAG for each block (getting CSE of
//! repeated pure computations for free) and then emits machine
//! instructions by walking the block's nodes in creation order, which is a
//! topological order: operands always precede their users, and the chain
//! operands keep side effects in program order.
//!
//! The MIR produced here meets the same contract as the direct selector in
//! `lower`; only the amount of sharing differs.

use crate::dag::{DagBuilder, Opcode, SDNode, SDValue, SelectionDag};
use crate::ir::{self, Block, FloatCC, IntCC, Value};
use crate::isa::aarch64::abi::{arg_reg, retval_reg, staging_reg, FP_LR_SIZE};
use crate::isa::aarch64::args::{AMode, Cond, RegImm};
use crate::isa::aarch64::inst::{ALUOp, FPUOp, Inst, PhiSrc};
use crate::isa::aarch64::regs::{zero_reg, ZERO_REG};
use crate::mir::{DataType, MachFunction, Reg, I32, I64};
use crate::{CodegenError, CodegenResult};
use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Lower `func` to machine instructions through the selection DAG.
pub fn lower_function_dag(
    func: &ir::Function,
    module: &ir::Module,
) -> CodegenResult<MachFunction<Inst>> {
    let mut builder = DagBuilder::new(func, module);
    let mut ctx = DagIselCtx {
        mfunc: MachFunction::new(func.sig.name.clone()),
        value_map: FxHashMap::default(),
        node_reg: FxHashMap::default(),
        cur: Block::from_u32(0),
        insts: Vec::new(),
    };

    let blocks: Vec<Block> = func.blocks.keys().collect();
    for &block in &blocks {
        match func.blocks[block].insts.last() {
            Some(inst) if inst.is_terminator() => {}
            _ => {
                return Err(CodegenError::Malformed(format!(
                    "{}: {block} does not end in a terminator",
                    func.sig.name
                )))
            }
        }
        ctx.mfunc.ensure_block(block);
    }

    let entry = func
        .entry_block()
        .ok_or_else(|| CodegenError::Malformed("function with no blocks".to_string()))?;
    ctx.cur = entry;
    ctx.setup_parameters(func);
    ctx.flush();

    for &block in &blocks {
        ctx.cur = block;
        let start = builder.dag.node_count();
        builder.build_block(block, &mut ctx.mfunc.frame)?;
        let end = builder.dag.node_count();
        if log::log_enabled!(log::Level::Trace) {
            trace!("dag for {block}:\n{}", builder.dag.dump(start..end));
        }
        for idx in start..end {
            let node = SDNode::from_u32(idx as u32);
            ctx.emit_node(&builder.dag, node)?;
        }
        ctx.flush();
    }

    debug!(
        "dag-lowered {}: {} nodes",
        ctx.mfunc.name,
        builder.dag.node_count()
    );
    Ok(ctx.mfunc)
}

struct DagIselCtx {
    mfunc: MachFunction<Inst>,
    /// IR value -> vreg, shared across blocks so cross-block defs connect.
    value_map: FxHashMap<Value, Reg>,
    /// DAG node -> the vreg holding its (first) result.
    node_reg: FxHashMap<SDNode, Reg>,
    cur: Block,
    insts: Vec<Inst>,
}

impl DagIselCtx {
    fn emit(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    fn flush(&mut self) {
        let insts = std::mem::take(&mut self.insts);
        self.mfunc
            .blocks
            .get_mut(&self.cur)
            .expect("current block exists")
            .insts
            .extend(insts);
    }

    fn get_or_create_vreg(&mut self, value: Value, ty: DataType) -> Reg {
        if let Some(&reg) = self.value_map.get(&value) {
            return reg;
        }
        let reg = self.mfunc.make_vreg(ty);
        self.value_map.insert(value, reg);
        reg
    }

    /// The destination register for a value-producing node: the vreg of
    /// the IR value it defines when tagged, otherwise a fresh one.
    fn dest_reg(&mut self, dag: &SelectionDag, node: SDNode, ty: DataType) -> Reg {
        match dag.node(node).ir_value {
            Some(value) => {
                let reg = self.get_or_create_vreg(value, ty);
                // A forward reference may have guessed a narrower type.
                if reg.ty() != ty {
                    let reg = reg.with_ty(ty);
                    self.value_map.insert(value, reg);
                    reg
                } else {
                    reg
                }
            }
            None => self.mfunc.make_vreg(ty),
        }
    }

    /// The register carrying `value`'s result, materializing constants and
    /// symbol addresses lazily at the first use within a block.
    fn node_value(&mut self, dag: &SelectionDag, value: SDValue) -> Reg {
        let data = dag.node(value.node);
        debug_assert!(
            !data.value_types[value.result as usize].is_token(),
            "chain edge asked for a register"
        );
        if let Some(&reg) = self.node_reg.get(&value.node) {
            return reg;
        }
        let ty = data.value_types[0];
        match data.opcode {
            Opcode::ConstI64 => {
                let imm = data.imm.expect("const node carries payload");
                if imm == 0 {
                    let reg = zero_reg(ty);
                    self.node_reg.insert(value.node, reg);
                    return reg;
                }
                let rd = self.mfunc.make_vreg(ty);
                self.load_constant(rd, imm as u32);
                self.node_reg.insert(value.node, rd);
                rd
            }
            Opcode::ConstF32 => {
                let bits = data.fimm.expect("float const node carries payload");
                let rd = self.mfunc.make_vreg(ty);
                if bits == 0 {
                    self.emit(Inst::FpuMoveFromGpr {
                        rd,
                        rn: zero_reg(I32),
                    });
                } else {
                    let tmp = self.mfunc.make_vreg(I32);
                    self.load_constant(tmp, bits);
                    self.emit(Inst::FpuMoveFromGpr { rd, rn: tmp });
                }
                self.node_reg.insert(value.node, rd);
                rd
            }
            Opcode::Symbol => {
                let symbol = data.symbol.clone().expect("symbol node carries payload");
                let rd = self.mfunc.make_vreg(I64);
                self.emit(Inst::LoadSymbol { rd, symbol });
                self.node_reg.insert(value.node, rd);
                rd
            }
            Opcode::CopyFromReg => {
                let ir_value = data.ir_value.expect("copy_from_reg names a value");
                let reg = self.get_or_create_vreg(ir_value, ty);
                self.node_reg.insert(value.node, reg);
                reg
            }
            _ => panic!(
                "node {} ({}) used before being emitted",
                value.node,
                data.opcode.name()
            ),
        }
    }

    fn load_constant(&mut self, rd: Reg, bits: u32) {
        let mut insts = vec![];
        crate::isa::aarch64::abi::load_constant(&mut insts, rd, bits);
        self.insts.extend(insts);
    }

    fn widen_to_64(&mut self, reg: Reg) -> Reg {
        if !reg.is_virtual() && reg.num() == ZERO_REG {
            return zero_reg(I64);
        }
        let wide = self.mfunc.make_vreg(I64);
        self.emit(Inst::Uxtw { rd: wide, rn: reg });
        wide
    }

    /// Emit width-matched integer operands for a two-source operation.
    fn int_operands(&mut self, dag: &SelectionDag, lhs: SDValue, rhs: SDValue) -> (Reg, Reg) {
        let mut lhs = self.node_value(dag, lhs);
        let mut rhs = self.node_value(dag, rhs);
        if !lhs.ty().is_wide() && rhs.ty().is_wide() {
            lhs = self.widen_to_64(lhs);
        } else if lhs.ty().is_wide() && !rhs.ty().is_wide() {
            rhs = self.widen_to_64(rhs);
        }
        (lhs, rhs)
    }

    fn setup_parameters(&mut self, func: &ir::Function) {
        let mut gpr_idx = 0usize;
        let mut fpr_idx = 0usize;
        let mut stack_off = 0i32;
        for (&ty, &value) in func.sig.params.iter().zip(&func.params) {
            let dt = DataType::from_ir(ty);
            let vreg = self.get_or_create_vreg(value, dt);
            self.mfunc.params.push(vreg);
            let idx = if dt.is_float() {
                &mut fpr_idx
            } else {
                &mut gpr_idx
            };
            if *idx < 8 {
                self.emit(Inst::Mov {
                    rd: vreg,
                    rm: arg_reg(*idx, dt),
                });
                *idx += 1;
            } else {
                self.mfunc.has_stack_param = true;
                self.emit(Inst::Load {
                    rd: vreg,
                    mem: AMode::FPOffset(FP_LR_SIZE + stack_off),
                });
                stack_off += 8;
            }
        }
    }

    fn emit_node(&mut self, dag: &SelectionDag, node: SDNode) -> CodegenResult<()> {
        let data = dag.node(node).clone();
        let ops = &data.operands;
        match data.opcode {
            // No code: these either carry no value or materialize lazily
            // at their first use.
            Opcode::EntryToken
            | Opcode::TokenFactor
            | Opcode::Label
            | Opcode::Symbol
            | Opcode::ConstI32
            | Opcode::ConstI64
            | Opcode::ConstF32
            | Opcode::Copy
            | Opcode::CopyFromReg
            | Opcode::Gep => Ok(()),

            Opcode::FrameIndex => {
                let fi = data.frame_index.expect("frame_index node carries payload");
                let rd = self.dest_reg(dag, node, I64);
                self.emit(Inst::FrameAddr { rd, fi });
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Shl
            | Opcode::Ashr
            | Opcode::Lshr
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => {
                let (lhs, rhs) = self.int_operands(dag, ops[0], ops[1]);
                let dt = lhs.ty();
                let rd = self.dest_reg(dag, node, dt);
                let op = match data.opcode {
                    Opcode::Add => ALUOp::Add,
                    Opcode::Sub => ALUOp::Sub,
                    Opcode::Mul => ALUOp::Mul,
                    Opcode::Div => ALUOp::SDiv,
                    Opcode::Shl => ALUOp::Lsl,
                    Opcode::Ashr => ALUOp::Asr,
                    Opcode::Lshr => ALUOp::Lsr,
                    Opcode::And => ALUOp::And,
                    Opcode::Or => ALUOp::Orr,
                    Opcode::Xor => ALUOp::Eor,
                    _ => unreachable!(),
                };
                let zero = |reg: Reg| !reg.is_virtual() && reg.num() == ZERO_REG;
                if op == ALUOp::Add && zero(rhs) {
                    self.emit(Inst::Mov { rd, rm: lhs });
                } else if op == ALUOp::Add && zero(lhs) {
                    self.emit(Inst::Mov { rd, rm: rhs });
                } else if op == ALUOp::Sub && zero(rhs) {
                    self.emit(Inst::Mov { rd, rm: lhs });
                } else {
                    self.emit(Inst::AluRRR {
                        op,
                        rd,
                        rn: lhs,
                        rm: rhs,
                    });
                }
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::Rem => {
                let (lhs, rhs) = self.int_operands(dag, ops[0], ops[1]);
                let dt = lhs.ty();
                let div = self.mfunc.make_vreg(dt);
                let mul = self.mfunc.make_vreg(dt);
                let rd = self.dest_reg(dag, node, dt);
                self.emit(Inst::AluRRR {
                    op: ALUOp::SDiv,
                    rd: div,
                    rn: lhs,
                    rm: rhs,
                });
                self.emit(Inst::AluRRR {
                    op: ALUOp::Mul,
                    rd: mul,
                    rn: div,
                    rm: rhs,
                });
                self.emit(Inst::AluRRR {
                    op: ALUOp::Sub,
                    rd,
                    rn: lhs,
                    rm: mul,
                });
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv => {
                let lhs = self.node_value(dag, ops[0]);
                let rhs = self.node_value(dag, ops[1]);
                let dt = data.value_types[0];
                let rd = self.dest_reg(dag, node, dt);
                let op = match data.opcode {
                    Opcode::Fadd => FPUOp::Fadd,
                    Opcode::Fsub => FPUOp::Fsub,
                    Opcode::Fmul => FPUOp::Fmul,
                    Opcode::Fdiv => FPUOp::Fdiv,
                    _ => unreachable!(),
                };
                self.emit(Inst::FpuRRR {
                    op,
                    rd,
                    rn: lhs,
                    rm: rhs,
                });
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::Zext => {
                let src = self.node_value(dag, ops[0]);
                let dt = data.value_types[0];
                let rd = self.dest_reg(dag, node, dt);
                if dt.is_wide() && !src.ty().is_wide() {
                    self.emit(Inst::Uxtw { rd, rn: src });
                } else {
                    self.emit(Inst::Mov { rd, rm: src });
                }
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::SiToFp => {
                let src = self.node_value(dag, ops[0]);
                let dt = data.value_types[0];
                let rd = self.dest_reg(dag, node, dt);
                self.emit(Inst::ScvtF { rd, rn: src });
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::FpToSi => {
                let src = self.node_value(dag, ops[0]);
                let dt = data.value_types[0];
                let rd = self.dest_reg(dag, node, dt);
                self.emit(Inst::FcvtZs { rd, rn: src });
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::Icmp => {
                let (lhs, rhs) = self.int_operands(dag, ops[0], ops[1]);
                let cc = IntCC::all()[data.imm.expect("icmp carries a condition") as usize];
                self.emit(Inst::Cmp {
                    rn: lhs,
                    rm: RegImm::Reg(rhs),
                });
                let rd = self.dest_reg(dag, node, I32);
                self.emit(Inst::CSet {
                    rd,
                    cond: Cond::from_intcc(cc),
                });
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::Fcmp => {
                let lhs = self.node_value(dag, ops[0]);
                let rhs = self.node_value(dag, ops[1]);
                let cc = FloatCC::all()[data.imm.expect("fcmp carries a condition") as usize];
                self.emit(Inst::FpuCmp { rn: lhs, rm: rhs });
                let rd = self.dest_reg(dag, node, I32);
                self.emit(Inst::CSet {
                    rd,
                    cond: Cond::from_floatcc(cc),
                });
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::Load => {
                // Operands: {chain, ptr}; results: {value, chain}.
                let base = self.node_value(dag, ops[1]);
                let dt = data.value_types[0];
                let rd = self.dest_reg(dag, node, dt);
                self.emit(Inst::Load {
                    rd,
                    mem: AMode::RegOffset(base, 0),
                });
                self.node_reg.insert(node, rd);
                Ok(())
            }

            Opcode::Store => {
                // Operands: {chain, value, ptr}.
                let rt = self.node_value(dag, ops[1]);
                let base = self.node_value(dag, ops[2]);
                self.emit(Inst::Store {
                    rt,
                    mem: AMode::RegOffset(base, 0),
                });
                Ok(())
            }

            Opcode::Call => {
                // Operands: {chain, callee, args...}.
                let callee = dag
                    .node(ops[1].node)
                    .symbol
                    .clone()
                    .expect("call target is a symbol");
                let args: Vec<Reg> = ops[2..]
                    .iter()
                    .map(|&arg| self.node_value(dag, arg))
                    .collect();
                self.lower_call_regs(&callee, &args);
                if !data.value_types[0].is_token() {
                    let dt = data.value_types[0];
                    let rd = self.dest_reg(dag, node, dt);
                    self.emit(Inst::Mov {
                        rd,
                        rm: retval_reg(dt),
                    });
                    self.node_reg.insert(node, rd);
                }
                Ok(())
            }

            Opcode::Ret => {
                if ops.len() > 1 {
                    let reg = self.node_value(dag, ops[1]);
                    self.emit(Inst::Mov {
                        rd: retval_reg(reg.ty()),
                        rm: reg,
                    });
                }
                self.emit(Inst::Ret);
                Ok(())
            }

            Opcode::Br => {
                // Operands: {chain, label}.
                let dest = dag.node(ops[1].node).label.expect("branch targets a label");
                self.emit(Inst::Jump { dest });
                Ok(())
            }

            Opcode::BrCond => {
                // Operands: {chain, cond, true label, false label}.
                let cond = self.node_value(dag, ops[1]);
                let then_dest = dag.node(ops[2].node).label.expect("label");
                let else_dest = dag.node(ops[3].node).label.expect("label");
                self.emit(Inst::Cmp {
                    rn: cond,
                    rm: RegImm::Imm(0),
                });
                self.emit(Inst::CondBr {
                    cond: Cond::Ne,
                    dest: then_dest,
                });
                self.emit(Inst::Jump { dest: else_dest });
                Ok(())
            }

            Opcode::Phi => {
                // Operands alternate (label, value).
                let dt = data.value_types[0];
                let rd = self.dest_reg(dag, node, dt);
                let mut srcs = Vec::with_capacity(ops.len() / 2);
                for pair in ops.chunks(2) {
                    let block = dag.node(pair[0].node).label.expect("phi incoming label");
                    let value_node = dag.node(pair[1].node);
                    let src = match (value_node.opcode, value_node.imm) {
                        (Opcode::ConstI64, Some(imm)) => PhiSrc::Imm(imm as i32),
                        _ => PhiSrc::Reg(self.node_value(dag, pair[1])),
                    };
                    srcs.push((block, src));
                }
                self.emit(Inst::Phi { rd, srcs });
                self.node_reg.insert(node, rd);
                Ok(())
            }
        }
    }

    /// Shared call marshalling: `args` already hold the argument values.
    fn lower_call_regs(&mut self, callee: &str, args: &[Reg]) {
        let mut gpr_idx = 0usize;
        let mut fpr_idx = 0usize;
        let mut stack_off = 0i32;
        let mut slots: Vec<(Reg, Option<usize>, i32)> = Vec::with_capacity(args.len());
        for &arg in args {
            let idx = if arg.ty().is_float() {
                &mut fpr_idx
            } else {
                &mut gpr_idx
            };
            if *idx < 8 {
                slots.push((arg, Some(*idx), 0));
                *idx += 1;
            } else {
                slots.push((arg, None, stack_off));
                stack_off += 8;
            }
        }

        for &(reg, slot, off) in &slots {
            if slot.is_none() {
                self.emit(Inst::Store {
                    rt: reg,
                    mem: AMode::SPOffset(off),
                });
            }
        }
        let mut param_regs: SmallVec<[Reg; 8]> = SmallVec::new();
        for &(reg, slot, _) in &slots {
            if let Some(idx) = slot {
                self.emit(Inst::Mov {
                    rd: staging_reg(idx, reg.ty()),
                    rm: reg,
                });
                param_regs.push(arg_reg(idx, reg.ty()));
            }
        }
        for &(reg, slot, _) in &slots {
            if let Some(idx) = slot {
                self.emit(Inst::Mov {
                    rd: arg_reg(idx, reg.ty()),
                    rm: staging_reg(idx, reg.ty()),
                });
            }
        }
        self.emit(Inst::Call {
            callee: callee.to_string(),
            uses: param_regs,
        });
        self.mfunc.frame.set_param_area_size(stack_off as u32);
    }
}
