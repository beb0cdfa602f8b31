//! Direct IR to MIR instruction selection for AArch64.
//!
//! This is the pattern-per-instruction selector: each IR instruction maps
//! to a short, fixed MIR sequence. The DAG-based selector in `lower_dag`
//! produces the same MIR-level results but shares repeated pure
//! computations; both paths use the helpers in `abi`.

use crate::ir::{self, BinaryOp, Block, InstructionData, Operand, Value};
use crate::isa::aarch64::abi::{arg_reg, retval_reg, staging_reg, FP_LR_SIZE};
use crate::isa::aarch64::args::{AMode, Cond, RegImm};
use crate::isa::aarch64::inst::{ALUOp, FPUOp, Inst, PhiSrc};
use crate::isa::aarch64::regs::{zero_reg, ZERO_REG};
use crate::mir::{DataType, MachFunction, Reg, F32, I32, I64, PTR};
use crate::{CodegenError, CodegenResult};
use log::debug;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Lower `func` to machine instructions.
pub fn lower_function(
    func: &ir::Function,
    module: &ir::Module,
) -> CodegenResult<MachFunction<Inst>> {
    let mut ctx = LowerCtx::new(func, module);
    ctx.run()?;
    debug!(
        "lowered {}: {} blocks",
        ctx.mfunc.name,
        ctx.mfunc.blocks.len()
    );
    Ok(ctx.mfunc)
}

struct LowerCtx<'a> {
    func: &'a ir::Function,
    module: &'a ir::Module,
    mfunc: MachFunction<Inst>,
    value_map: FxHashMap<Value, Reg>,
    cur: Block,
}

fn int_alu_op(op: BinaryOp) -> ALUOp {
    match op {
        BinaryOp::Add => ALUOp::Add,
        BinaryOp::Sub => ALUOp::Sub,
        BinaryOp::Mul => ALUOp::Mul,
        BinaryOp::Div => ALUOp::SDiv,
        BinaryOp::And => ALUOp::And,
        BinaryOp::Or => ALUOp::Orr,
        BinaryOp::Xor => ALUOp::Eor,
        BinaryOp::Shl => ALUOp::Lsl,
        BinaryOp::Lshr => ALUOp::Lsr,
        BinaryOp::Ashr => ALUOp::Asr,
        // Rem is expanded before reaching here.
        BinaryOp::Rem => unreachable!("srem expands to sdiv/mul/sub"),
        _ => unreachable!("float op in integer selection"),
    }
}

fn float_alu_op(op: BinaryOp) -> FPUOp {
    match op {
        BinaryOp::Fadd => FPUOp::Fadd,
        BinaryOp::Fsub => FPUOp::Fsub,
        BinaryOp::Fmul => FPUOp::Fmul,
        BinaryOp::Fdiv => FPUOp::Fdiv,
        _ => unreachable!("integer op in float selection"),
    }
}

impl<'a> LowerCtx<'a> {
    fn new(func: &'a ir::Function, module: &'a ir::Module) -> Self {
        let mfunc = MachFunction::new(func.sig.name.clone());
        Self {
            func,
            module,
            mfunc,
            value_map: FxHashMap::default(),
            cur: Block::from_u32(0),
        }
    }

    fn run(&mut self) -> CodegenResult<()> {
        for (block, data) in self.func.blocks.iter() {
            match data.insts.last() {
                Some(inst) if inst.is_terminator() => {}
                _ => {
                    return Err(CodegenError::Malformed(format!(
                        "{}: {block} does not end in a terminator",
                        self.func.sig.name
                    )))
                }
            }
            self.mfunc.ensure_block(block);
        }

        let entry = self
            .func
            .entry_block()
            .ok_or_else(|| CodegenError::Malformed("function with no blocks".to_string()))?;
        self.cur = entry;
        self.setup_parameters();
        self.collect_allocas();

        let blocks: Vec<Block> = self.func.blocks.keys().collect();
        for block in blocks {
            self.cur = block;
            let insts = self.func.blocks[block].insts.clone();
            for inst in &insts {
                self.lower_inst(inst)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, inst: Inst) {
        self.mfunc
            .blocks
            .get_mut(&self.cur)
            .expect("current block exists")
            .insts
            .push(inst);
    }

    /// The backend vreg carrying IR value `value`, created on first sight.
    fn get_or_create_vreg(&mut self, value: Value, ty: DataType) -> Reg {
        if let Some(&reg) = self.value_map.get(&value) {
            return reg;
        }
        let reg = self.mfunc.make_vreg(ty);
        self.value_map.insert(value, reg);
        reg
    }

    /// The register holding `operand`, materializing immediates as needed.
    fn get_reg(&mut self, operand: Operand) -> Reg {
        match operand {
            Operand::Value(value) => {
                if let Some(&reg) = self.value_map.get(&value) {
                    return reg;
                }
                // A forward reference (phi back-edge) or an argument that
                // has no recorded type; default to a 32-bit integer.
                let ty = self
                    .func
                    .value_type(value)
                    .map(DataType::from_ir)
                    .unwrap_or(I32);
                self.get_or_create_vreg(value, ty)
            }
            Operand::Iconst(imm) => {
                if imm == 0 {
                    return zero_reg(I32);
                }
                let rd = self.mfunc.make_vreg(I32);
                self.load_constant(rd, imm as u32);
                rd
            }
            Operand::Fconst(imm) => {
                let rd = self.mfunc.make_vreg(F32);
                if imm == 0.0 {
                    // Float zero comes straight from the integer zero
                    // register.
                    self.emit(Inst::FpuMoveFromGpr {
                        rd,
                        rn: zero_reg(I32),
                    });
                    return rd;
                }
                // Materialize the bit pattern in an integer register, then
                // move it across register files unchanged.
                let bits = imm.to_bits();
                let tmp = self.mfunc.make_vreg(I32);
                self.load_constant(tmp, bits);
                self.emit(Inst::FpuMoveFromGpr { rd, rn: tmp });
                rd
            }
            Operand::Global(gv) => {
                let rd = self.mfunc.make_vreg(I64);
                self.emit(Inst::LoadSymbol {
                    rd,
                    symbol: self.module.globals[gv].name.clone(),
                });
                rd
            }
        }
    }

    fn load_constant(&mut self, rd: Reg, bits: u32) {
        let mut insts = vec![];
        crate::isa::aarch64::abi::load_constant(&mut insts, rd, bits);
        for inst in insts {
            self.emit(inst);
        }
    }

    /// The address register for a pointer operand: alloca results become a
    /// frame-index address, globals a symbol load.
    fn get_ptr_reg(&mut self, ptr: Operand) -> Reg {
        if let Operand::Value(value) = ptr {
            if let Some(fi) = self.mfunc.frame.local_for_value(value) {
                let base = self.mfunc.make_vreg(I64);
                self.emit(Inst::FrameAddr { rd: base, fi });
                return base;
            }
        }
        self.get_reg(ptr)
    }

    /// Widen `reg` to 64 bits for use alongside a 64-bit operand.
    fn widen_to_64(&mut self, reg: Reg) -> Reg {
        if !reg.is_virtual() && reg.num() == ZERO_REG {
            return zero_reg(I64);
        }
        let wide = self.mfunc.make_vreg(I64);
        self.emit(Inst::Uxtw { rd: wide, rn: reg });
        wide
    }

    /// Incoming parameters: registers for the first eight per bank, the
    /// frame-pointer-relative stack area beyond that.
    fn setup_parameters(&mut self) {
        let mut gpr_idx = 0usize;
        let mut fpr_idx = 0usize;
        let mut stack_off = 0i32;
        let params: Vec<(ir::Type, Value)> = self
            .func
            .sig
            .params
            .iter()
            .copied()
            .zip(self.func.params.iter().copied())
            .collect();
        for (ty, value) in params {
            let dt = DataType::from_ir(ty);
            let vreg = self.get_or_create_vreg(value, dt);
            self.mfunc.params.push(vreg);
            let (idx, count) = if dt.is_float() {
                (&mut fpr_idx, 8)
            } else {
                (&mut gpr_idx, 8)
            };
            if *idx < count {
                self.emit(Inst::Mov {
                    rd: vreg,
                    rm: arg_reg(*idx, dt),
                });
                *idx += 1;
            } else {
                // Stack parameters sit above the saved FP/LR pair.
                self.mfunc.has_stack_param = true;
                self.emit(Inst::Load {
                    rd: vreg,
                    mem: AMode::FPOffset(FP_LR_SIZE + stack_off),
                });
                stack_off += 8;
            }
        }
    }

    /// Create frame storage for every alloca up front, so loads and stores
    /// in earlier-numbered blocks can recognize alloca addresses.
    fn collect_allocas(&mut self) {
        for data in self.func.blocks.values() {
            for inst in &data.insts {
                if let InstructionData::Alloca { result, ty, dims } = inst {
                    let mut size = ty.bytes();
                    for &d in dims {
                        size *= d;
                    }
                    self.mfunc.frame.create_local(*result, size, 16);
                }
            }
        }
    }

    fn lower_inst(&mut self, inst: &InstructionData) -> CodegenResult<()> {
        match inst {
            InstructionData::Alloca { result, .. } => {
                // Storage exists already; materialize the address so the
                // value can be used directly (e.g. passed to a call).
                let fi = self
                    .mfunc
                    .frame
                    .local_for_value(*result)
                    .expect("alloca collected");
                let rd = self.get_or_create_vreg(*result, I64);
                self.emit(Inst::FrameAddr { rd, fi });
                Ok(())
            }
            InstructionData::Load { result, ty, ptr } => {
                let rd = self.get_or_create_vreg(*result, DataType::from_ir(*ty));
                let base = self.get_ptr_reg(*ptr);
                self.emit(Inst::Load {
                    rd,
                    mem: AMode::RegOffset(base, 0),
                });
                Ok(())
            }
            InstructionData::Store { ty, value, ptr } => {
                let rt = self.get_reg(*value);
                let rt = if rt.ty() != DataType::from_ir(*ty) && !rt.ty().is_float() {
                    rt.with_ty(DataType::from_ir(*ty))
                } else {
                    rt
                };
                let base = self.get_ptr_reg(*ptr);
                self.emit(Inst::Store {
                    rt,
                    mem: AMode::RegOffset(base, 0),
                });
                Ok(())
            }
            InstructionData::Binary {
                op,
                ty,
                result,
                lhs,
                rhs,
            } => self.lower_binary(*op, *ty, *result, *lhs, *rhs),
            InstructionData::IntCompare {
                cond,
                result,
                lhs,
                rhs,
            } => {
                let mut lhs = self.get_reg(*lhs);
                let mut rhs = self.get_reg(*rhs);
                // Compare at a single width; widen the narrow side.
                if !lhs.ty().is_wide() && rhs.ty().is_wide() {
                    lhs = self.widen_to_64(lhs);
                } else if lhs.ty().is_wide() && !rhs.ty().is_wide() {
                    rhs = self.widen_to_64(rhs);
                }
                self.emit(Inst::Cmp {
                    rn: lhs,
                    rm: RegImm::Reg(rhs),
                });
                let rd = self.get_or_create_vreg(*result, I32);
                self.emit(Inst::CSet {
                    rd,
                    cond: Cond::from_intcc(*cond),
                });
                Ok(())
            }
            InstructionData::FloatCompare {
                cond,
                result,
                lhs,
                rhs,
            } => {
                let lhs = self.get_reg(*lhs);
                let rhs = self.get_reg(*rhs);
                self.emit(Inst::FpuCmp { rn: lhs, rm: rhs });
                let rd = self.get_or_create_vreg(*result, I32);
                self.emit(Inst::CSet {
                    rd,
                    cond: Cond::from_floatcc(*cond),
                });
                Ok(())
            }
            InstructionData::Branch { dest } => {
                self.emit(Inst::Jump { dest: *dest });
                Ok(())
            }
            InstructionData::BranchCond {
                cond,
                then_dest,
                else_dest,
            } => {
                let cond = self.get_reg(*cond);
                self.emit(Inst::Cmp {
                    rn: cond,
                    rm: RegImm::Imm(0),
                });
                self.emit(Inst::CondBr {
                    cond: Cond::Ne,
                    dest: *then_dest,
                });
                self.emit(Inst::Jump { dest: *else_dest });
                Ok(())
            }
            InstructionData::Phi { result, ty, args } => {
                let dt = DataType::from_ir(*ty);
                let rd = self.get_or_create_vreg(*result, dt);
                let mut srcs = Vec::with_capacity(args.len());
                for (block, value) in args {
                    let src = match value {
                        Operand::Value(v) => PhiSrc::Reg(self.get_or_create_vreg(*v, dt)),
                        Operand::Iconst(imm) => PhiSrc::Imm(*imm),
                        // Rare; materializing here puts the constant in the
                        // phi's own block, which phi elimination tolerates.
                        other => PhiSrc::Reg(self.get_reg(*other)),
                    };
                    srcs.push((*block, src));
                }
                self.emit(Inst::Phi { rd, srcs });
                Ok(())
            }
            InstructionData::Call {
                result,
                ret_ty,
                callee,
                args,
            } => self.lower_call(result.as_ref().copied(), *ret_ty, callee, args),
            InstructionData::Return { value } => {
                if let Some((ty, operand)) = value {
                    let reg = self.get_reg(*operand);
                    let dt = DataType::from_ir(*ty);
                    self.emit(Inst::Mov {
                        rd: retval_reg(dt),
                        rm: reg,
                    });
                }
                self.emit(Inst::Ret);
                Ok(())
            }
            InstructionData::GetElementPtr {
                result,
                elem_ty,
                base,
                dims,
                indices,
            } => self.lower_gep(*result, *elem_ty, *base, dims, indices),
            InstructionData::Zext {
                result,
                from,
                to,
                arg,
            } => {
                let src = self.get_reg(*arg);
                let dt = DataType::from_ir(*to);
                let rd = self.get_or_create_vreg(*result, dt);
                if *from == ir::Type::I1 && *to == ir::Type::I32 {
                    // cset leaves a clean 0/1, but masking keeps this
                    // correct for sources that are not.
                    self.emit(Inst::AluRRImm12 {
                        op: ALUOp::And,
                        rd,
                        rn: src,
                        imm12: 1,
                    });
                } else if dt.is_wide() && !src.ty().is_wide() {
                    self.emit(Inst::Uxtw { rd, rn: src });
                } else {
                    self.emit(Inst::Mov { rd, rm: src });
                }
                Ok(())
            }
            InstructionData::SiToFp { result, arg } => {
                let src = self.get_reg(*arg);
                let rd = self.get_or_create_vreg(*result, F32);
                self.emit(Inst::ScvtF { rd, rn: src });
                Ok(())
            }
            InstructionData::FpToSi { result, arg } => {
                let src = self.get_reg(*arg);
                let rd = self.get_or_create_vreg(*result, I32);
                self.emit(Inst::FcvtZs { rd, rn: src });
                Ok(())
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        ty: ir::Type,
        result: Value,
        lhs: Operand,
        rhs: Operand,
    ) -> CodegenResult<()> {
        if op.is_float() {
            let lhs = self.get_reg(lhs);
            let rhs = self.get_reg(rhs);
            let rd = self.get_or_create_vreg(result, DataType::from_ir(ty));
            self.emit(Inst::FpuRRR {
                op: float_alu_op(op),
                rd,
                rn: lhs,
                rm: rhs,
            });
            return Ok(());
        }

        let mut lhs = self.get_reg(lhs);
        let mut rhs = self.get_reg(rhs);
        // Integer operands must agree on width.
        if !lhs.ty().is_wide() && rhs.ty().is_wide() {
            lhs = self.widen_to_64(lhs);
        } else if lhs.ty().is_wide() && !rhs.ty().is_wide() {
            rhs = self.widen_to_64(rhs);
        }
        let dt = lhs.ty();

        if op == BinaryOp::Rem {
            // No remainder instruction: res = lhs - (lhs / rhs) * rhs.
            let div = self.mfunc.make_vreg(dt);
            let mul = self.mfunc.make_vreg(dt);
            let rd = self.get_or_create_vreg(result, dt);
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
            return Ok(());
        }

        let alu_op = int_alu_op(op);
        let rd = self.get_or_create_vreg(result, dt);

        // x+0, 0+x and x-0 degenerate to moves.
        let zero = |reg: Reg| !reg.is_virtual() && reg.num() == ZERO_REG;
        if alu_op == ALUOp::Add && zero(rhs) {
            self.emit(Inst::Mov { rd, rm: lhs });
            return Ok(());
        }
        if alu_op == ALUOp::Add && zero(lhs) {
            self.emit(Inst::Mov { rd, rm: rhs });
            return Ok(());
        }
        if alu_op == ALUOp::Sub && zero(rhs) {
            self.emit(Inst::Mov { rd, rm: lhs });
            return Ok(());
        }

        self.emit(Inst::AluRRR {
            op: alu_op,
            rd,
            rn: lhs,
            rm: rhs,
        });
        Ok(())
    }

    fn lower_call(
        &mut self,
        result: Option<Value>,
        ret_ty: ir::Type,
        callee: &str,
        args: &[(ir::Type, Operand)],
    ) -> CodegenResult<()> {
        struct ArgInfo {
            vreg: Reg,
            ty: DataType,
            slot: ArgSlot,
        }
        enum ArgSlot {
            Reg(usize),
            Stack(i32),
        }

        let mut gpr_idx = 0usize;
        let mut fpr_idx = 0usize;
        let mut stack_off = 0i32;
        let mut infos: Vec<ArgInfo> = Vec::with_capacity(args.len());

        for (ty, operand) in args {
            let vreg = self.get_reg(*operand);
            let ty = if vreg.ty().is_float() {
                vreg.ty()
            } else {
                DataType::from_ir(*ty)
            };
            let idx = if ty.is_float() {
                &mut fpr_idx
            } else {
                &mut gpr_idx
            };
            let slot = if *idx < 8 {
                let s = ArgSlot::Reg(*idx);
                *idx += 1;
                s
            } else {
                let s = ArgSlot::Stack(stack_off);
                stack_off += 8;
                s
            };
            infos.push(ArgInfo { vreg, ty, slot });
        }

        // Stack arguments first, while no argument register has been
        // touched yet.
        for info in &infos {
            if let ArgSlot::Stack(off) = info.slot {
                self.emit(Inst::Store {
                    rt: info.vreg,
                    mem: AMode::SPOffset(off),
                });
            }
        }

        // Register arguments stage through temporaries to avoid one
        // argument's marshalling clobbering another's source.
        let mut param_regs: SmallVec<[Reg; 8]> = SmallVec::new();
        for info in &infos {
            if let ArgSlot::Reg(idx) = info.slot {
                self.emit(Inst::Mov {
                    rd: staging_reg(idx, info.ty),
                    rm: info.vreg,
                });
                param_regs.push(arg_reg(idx, info.ty));
            }
        }
        for info in &infos {
            if let ArgSlot::Reg(idx) = info.slot {
                self.emit(Inst::Mov {
                    rd: arg_reg(idx, info.ty),
                    rm: staging_reg(idx, info.ty),
                });
            }
        }

        self.emit(Inst::Call {
            callee: callee.to_string(),
            uses: param_regs,
        });
        self.mfunc.frame.set_param_area_size(stack_off as u32);

        if let Some(result) = result {
            if ret_ty == ir::Type::Void {
                return Err(CodegenError::Malformed(format!(
                    "call to @{callee} is void but defines a result"
                )));
            }
            let dt = DataType::from_ir(ret_ty);
            let rd = self.get_or_create_vreg(result, dt);
            self.emit(Inst::Mov {
                rd,
                rm: retval_reg(dt),
            });
        }
        Ok(())
    }

    fn lower_gep(
        &mut self,
        result: Value,
        elem_ty: ir::Type,
        base: Operand,
        dims: &[u32],
        indices: &[Operand],
    ) -> CodegenResult<()> {
        let base = self.get_ptr_reg(base);
        let elem_size = elem_ty.bytes() as i64;

        // Row-major strides over the declared dimensions; indices past the
        // last dimension step by the element size.
        let mut strides = vec![0i64; dims.len()];
        let mut current = elem_size;
        for i in (0..dims.len()).rev() {
            strides[i] = current;
            current *= i64::from(dims[i]);
        }

        let mut acc: Option<Reg> = None;
        for (i, index) in indices.iter().enumerate() {
            let mut idx = self.get_reg(*index);
            if !idx.ty().is_wide() {
                // Indices widen as unsigned, matching the original
                // expansion; negative 32-bit indices are out of contract.
                idx = self.widen_to_64(idx);
            }
            let stride = strides.get(i).copied().unwrap_or(elem_size);
            let stride_reg = self.mfunc.make_vreg(I64);
            self.load_constant(stride_reg, stride as u32);
            let term = self.mfunc.make_vreg(I64);
            self.emit(Inst::AluRRR {
                op: ALUOp::Mul,
                rd: term,
                rn: idx,
                rm: stride_reg,
            });
            acc = Some(match acc {
                None => term,
                Some(prev) => {
                    let sum = self.mfunc.make_vreg(I64);
                    self.emit(Inst::AluRRR {
                        op: ALUOp::Add,
                        rd: sum,
                        rn: prev,
                        rm: term,
                    });
                    sum
                }
            });
        }

        let rd = self.get_or_create_vreg(result, PTR);
        match acc {
            Some(offset) => self.emit(Inst::AluRRR {
                op: ALUOp::Add,
                rd,
                rn: base,
                rm: offset,
            }),
            None => self.emit(Inst::Mov { rd, rm: base }),
        }
        Ok(())
    }
}
