//! Translating IR instructions into selection DAG nodes.
//!
//! The builder walks one block at a time, threading a chain value through
//! every side-effecting node so that memory operations, calls and control
//! transfers keep their program order. Pure computations take only data
//! operands and are freely shared through the folding set.

use crate::dag::{Opcode, SDValue, SelectionDag};
use crate::ir::{self, BinaryOp, Block, InstructionData, Operand, Value};
use crate::mir::{DataType, FrameInfo, F32, I32, I64, PTR, TOKEN};
use crate::{CodegenError, CodegenResult};
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

/// Builds the DAG for one function.
pub struct DagBuilder<'a> {
    func: &'a ir::Function,
    module: &'a ir::Module,
    /// The DAG being built. One per function; block boundaries are tracked
    /// by the caller through `SelectionDag::next_node`.
    pub dag: SelectionDag,
    value_map: FxHashMap<Value, SDValue>,
    current_chain: SDValue,
}

fn binop_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Rem => Opcode::Rem,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Ashr => Opcode::Ashr,
        BinaryOp::Lshr => Opcode::Lshr,
        BinaryOp::And => Opcode::And,
        BinaryOp::Or => Opcode::Or,
        BinaryOp::Xor => Opcode::Xor,
        BinaryOp::Fadd => Opcode::Fadd,
        BinaryOp::Fsub => Opcode::Fsub,
        BinaryOp::Fmul => Opcode::Fmul,
        BinaryOp::Fdiv => Opcode::Fdiv,
    }
}

impl<'a> DagBuilder<'a> {
    /// Create a builder for `func`.
    pub fn new(func: &'a ir::Function, module: &'a ir::Module) -> Self {
        let mut dag = SelectionDag::new();
        // A placeholder; every block resets the chain to the entry token.
        let entry = dag.get_node(Opcode::EntryToken, smallvec![TOKEN], SmallVec::new());
        Self {
            func,
            module,
            dag,
            value_map: FxHashMap::default(),
            current_chain: entry,
        }
    }

    /// Translate one block's instructions into nodes. `frame` receives the
    /// frame objects created for allocas.
    pub fn build_block(&mut self, block: Block, frame: &mut FrameInfo) -> CodegenResult<()> {
        self.dag.reset_cse();
        self.current_chain =
            self.dag
                .get_node(Opcode::EntryToken, smallvec![TOKEN], SmallVec::new());
        let insts = self.func.blocks[block].insts.clone();
        for inst in &insts {
            self.build_inst(inst, frame)?;
        }
        Ok(())
    }

    /// The DAG value for `operand`. `want` is the type to assume for a
    /// value whose definition has not been seen yet.
    fn get_value(&mut self, operand: Operand, want: DataType) -> CodegenResult<SDValue> {
        match operand {
            Operand::Value(v) => {
                if let Some(&val) = self.value_map.get(&v) {
                    return Ok(val);
                }
                // Not defined in any block built so far: a function
                // argument or a cross-block definition.
                let ty = self
                    .func
                    .value_type(v)
                    .map(DataType::from_ir)
                    .unwrap_or(want);
                let val = self.dag.get_reg_node(v, ty);
                self.value_map.insert(v, val);
                Ok(val)
            }
            Operand::Iconst(imm) => Ok(self.dag.get_constant_i64(i64::from(imm), I32)),
            Operand::Fconst(imm) => Ok(self.dag.get_constant_f32(imm, F32)),
            Operand::Global(gv) => {
                let name = self.module.globals[gv].name.clone();
                Ok(self
                    .dag
                    .get_sym_node(Opcode::Symbol, smallvec![PTR], SmallVec::new(), name))
            }
        }
    }

    /// Record `val` as the definition of `result`.
    fn set_def(&mut self, result: Value, val: SDValue) {
        self.value_map.insert(result, val);
        self.dag.set_ir_value(val.node, result);
    }

    fn build_inst(&mut self, inst: &InstructionData, frame: &mut FrameInfo) -> CodegenResult<()> {
        match inst {
            InstructionData::Alloca { result, ty, dims } => {
                let mut size = ty.bytes();
                for &d in dims {
                    size *= d;
                }
                let fi = frame.create_local(*result, size, 16);
                let val = self.dag.get_frame_index_node(fi);
                self.dag.set_ir_value(val.node, *result);
                self.value_map.insert(*result, val);
                Ok(())
            }
            InstructionData::Load { result, ty, ptr } => {
                let vt = DataType::from_ir(*ty);
                let ptr = self.get_value(*ptr, PTR)?;
                let node = self.dag.get_node(
                    Opcode::Load,
                    smallvec![vt, TOKEN],
                    smallvec![self.current_chain, ptr],
                );
                // Result 0 is the loaded value, result 1 the new chain.
                self.set_def(*result, SDValue::new(node.node, 0));
                self.current_chain = SDValue::new(node.node, 1);
                Ok(())
            }
            InstructionData::Store { ty, value, ptr } => {
                let value = self.get_value(*value, DataType::from_ir(*ty))?;
                let ptr = self.get_value(*ptr, PTR)?;
                let node = self.dag.get_node(
                    Opcode::Store,
                    smallvec![TOKEN],
                    smallvec![self.current_chain, value, ptr],
                );
                // The store node itself is the new chain.
                self.current_chain = node;
                Ok(())
            }
            InstructionData::Binary {
                op,
                ty,
                result,
                lhs,
                rhs,
            } => {
                let vt = DataType::from_ir(*ty);
                let lhs = self.get_value(*lhs, vt)?;
                let rhs = self.get_value(*rhs, vt)?;
                let node = self
                    .dag
                    .get_node(binop_opcode(*op), smallvec![vt], smallvec![lhs, rhs]);
                self.set_def(*result, node);
                Ok(())
            }
            InstructionData::IntCompare {
                cond,
                result,
                lhs,
                rhs,
            } => {
                let lhs = self.get_value(*lhs, I32)?;
                let rhs = self.get_value(*rhs, I32)?;
                let node = self.dag.get_imm_node(
                    Opcode::Icmp,
                    smallvec![I32],
                    smallvec![lhs, rhs],
                    *cond as i64,
                );
                self.set_def(*result, node);
                Ok(())
            }
            InstructionData::FloatCompare {
                cond,
                result,
                lhs,
                rhs,
            } => {
                let lhs = self.get_value(*lhs, F32)?;
                let rhs = self.get_value(*rhs, F32)?;
                let node = self.dag.get_imm_node(
                    Opcode::Fcmp,
                    smallvec![I32],
                    smallvec![lhs, rhs],
                    *cond as i64,
                );
                self.set_def(*result, node);
                Ok(())
            }
            InstructionData::Branch { dest } => {
                let label = self.dag.get_label_node(*dest);
                self.dag.get_node(
                    Opcode::Br,
                    smallvec![TOKEN],
                    smallvec![self.current_chain, label],
                );
                Ok(())
            }
            InstructionData::BranchCond {
                cond,
                then_dest,
                else_dest,
            } => {
                let cond = self.get_value(*cond, I32)?;
                let then_label = self.dag.get_label_node(*then_dest);
                let else_label = self.dag.get_label_node(*else_dest);
                self.dag.get_node(
                    Opcode::BrCond,
                    smallvec![TOKEN],
                    smallvec![self.current_chain, cond, then_label, else_label],
                );
                Ok(())
            }
            InstructionData::Phi { result, ty, args } => {
                let vt = DataType::from_ir(*ty);
                let mut ops: SmallVec<[SDValue; 4]> = SmallVec::new();
                // Operands alternate (incoming label, incoming value).
                for (block, value) in args {
                    ops.push(self.dag.get_label_node(*block));
                    ops.push(self.get_value(*value, vt)?);
                }
                let node = self.dag.get_node(Opcode::Phi, smallvec![vt], ops);
                self.set_def(*result, node);
                Ok(())
            }
            InstructionData::Call {
                result,
                ret_ty,
                callee,
                args,
            } => {
                let mut ops: SmallVec<[SDValue; 4]> = smallvec![self.current_chain];
                ops.push(self.dag.get_sym_node(
                    Opcode::Symbol,
                    smallvec![PTR],
                    SmallVec::new(),
                    callee.clone(),
                ));
                for (ty, arg) in args {
                    ops.push(self.get_value(*arg, DataType::from_ir(*ty))?);
                }
                if *ret_ty == ir::Type::Void {
                    let node = self.dag.get_node(Opcode::Call, smallvec![TOKEN], ops);
                    self.current_chain = node;
                } else {
                    let vt = DataType::from_ir(*ret_ty);
                    let node = self.dag.get_node(Opcode::Call, smallvec![vt, TOKEN], ops);
                    if let Some(result) = result {
                        self.set_def(*result, SDValue::new(node.node, 0));
                    }
                    self.current_chain = SDValue::new(node.node, 1);
                }
                Ok(())
            }
            InstructionData::Return { value } => {
                let mut ops: SmallVec<[SDValue; 4]> = smallvec![self.current_chain];
                if let Some((ty, operand)) = value {
                    ops.push(self.get_value(*operand, DataType::from_ir(*ty))?);
                }
                self.dag.get_node(Opcode::Ret, SmallVec::new(), ops);
                Ok(())
            }
            InstructionData::GetElementPtr {
                result,
                elem_ty,
                base,
                dims,
                indices,
            } => {
                let base = self.get_value(*base, PTR)?;
                let elem_size = i64::from(elem_ty.bytes());
                let mut total = self.dag.get_constant_i64(0, I64);

                // Row-major strides: stride[i] = elem_size * product of the
                // dimensions after i. Trailing indices past the last
                // dimension step by the element size.
                let mut strides = vec![0i64; dims.len()];
                let mut current = elem_size;
                for i in (0..dims.len()).rev() {
                    strides[i] = current;
                    current *= i64::from(dims[i]);
                }

                for (i, index) in indices.iter().enumerate() {
                    let index = self.get_value(*index, I32)?;
                    // Indices are zero-extended to 64 bits before scaling.
                    let wide = self
                        .dag
                        .get_node(Opcode::Zext, smallvec![I64], smallvec![index]);
                    let stride = strides.get(i).copied().unwrap_or(elem_size);
                    let stride = self.dag.get_constant_i64(stride, I64);
                    let term = self
                        .dag
                        .get_node(Opcode::Mul, smallvec![I64], smallvec![wide, stride]);
                    total = self
                        .dag
                        .get_node(Opcode::Add, smallvec![I64], smallvec![total, term]);
                }

                let addr = self
                    .dag
                    .get_node(Opcode::Add, smallvec![PTR], smallvec![base, total]);
                self.set_def(*result, addr);
                Ok(())
            }
            InstructionData::Zext {
                result, to, arg, ..
            } => {
                let arg = self.get_value(*arg, I32)?;
                let node = self.dag.get_node(
                    Opcode::Zext,
                    smallvec![DataType::from_ir(*to)],
                    smallvec![arg],
                );
                self.set_def(*result, node);
                Ok(())
            }
            InstructionData::SiToFp { result, arg } => {
                let arg = self.get_value(*arg, I32)?;
                let node = self
                    .dag
                    .get_node(Opcode::SiToFp, smallvec![F32], smallvec![arg]);
                self.set_def(*result, node);
                Ok(())
            }
            InstructionData::FpToSi { result, arg } => {
                let arg = self.get_value(*arg, F32)?;
                let node = self
                    .dag
                    .get_node(Opcode::FpToSi, smallvec![I32], smallvec![arg]);
                self.set_def(*result, node);
                Ok(())
            }
        }
    }
}

impl DagBuilder<'_> {
    /// The recorded type of `v` as a machine type, for callers that need
    /// it after building.
    pub fn value_ty(&self, v: Value) -> CodegenResult<DataType> {
        self.func
            .value_type(v)
            .map(DataType::from_ir)
            .ok_or_else(|| CodegenError::MissingType(v.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Signature, Type};

    fn empty_module() -> ir::Module {
        ir::Module::new()
    }

    fn func_with_block(insts: Vec<InstructionData>) -> Function {
        let mut func = Function::new(Signature {
            name: "t".to_string(),
            ret: Type::I32,
            params: vec![],
        });
        let b0 = func.make_block();
        func.blocks[b0].insts = insts;
        func
    }

    #[test]
    fn repeated_pure_computation_is_folded() {
        let mut func = Function::new(Signature {
            name: "t".to_string(),
            ret: Type::I32,
            params: vec![],
        });
        let a = func.make_value(Type::I32);
        let x = func.make_value(Type::I32);
        let y = func.make_value(Type::I32);
        let b0 = func.make_block();
        func.blocks[b0].insts = vec![
            InstructionData::Binary {
                op: BinaryOp::Add,
                ty: Type::I32,
                result: x,
                lhs: Operand::Value(a),
                rhs: Operand::Iconst(1),
            },
            InstructionData::Binary {
                op: BinaryOp::Add,
                ty: Type::I32,
                result: y,
                lhs: Operand::Value(a),
                rhs: Operand::Iconst(1),
            },
            InstructionData::Return {
                value: Some((Type::I32, Operand::Value(y))),
            },
        ];

        let module = empty_module();
        let mut frame = FrameInfo::new();
        let mut builder = DagBuilder::new(&func, &module);
        builder.build_block(b0, &mut frame).unwrap();

        // entry token, copy-from-reg a, const 1, one shared add, ret.
        let add_nodes = builder
            .dag
            .iter()
            .filter(|(_, data)| data.opcode == Opcode::Add)
            .count();
        assert_eq!(add_nodes, 1);
    }

    #[test]
    fn stores_thread_the_chain() {
        let mut func = Function::new(Signature {
            name: "t".to_string(),
            ret: Type::Void,
            params: vec![],
        });
        let p = func.make_value(Type::Ptr);
        let b0 = func.make_block();
        func.blocks[b0].insts = vec![
            InstructionData::Alloca {
                result: p,
                ty: Type::I32,
                dims: vec![],
            },
            InstructionData::Store {
                ty: Type::I32,
                value: Operand::Iconst(1),
                ptr: Operand::Value(p),
            },
            InstructionData::Store {
                ty: Type::I32,
                value: Operand::Iconst(2),
                ptr: Operand::Value(p),
            },
            InstructionData::Return { value: None },
        ];

        let module = empty_module();
        let mut frame = FrameInfo::new();
        let mut builder = DagBuilder::new(&func, &module);
        builder.build_block(b0, &mut frame).unwrap();

        // The second store's first operand must be the first store node.
        let stores: Vec<_> = builder
            .dag
            .iter()
            .filter(|(_, data)| data.opcode == Opcode::Store)
            .map(|(node, data)| (node, data.clone()))
            .collect();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[1].1.operands[0].node, stores[0].0);
    }

    #[test]
    fn alloca_creates_a_frame_local() {
        let mut func = func_with_block(vec![]);
        let p = func.make_value(Type::Ptr);
        let b0 = func.entry_block().unwrap();
        func.blocks[b0].insts = vec![
            InstructionData::Alloca {
                result: p,
                ty: Type::I32,
                dims: vec![4, 5],
            },
            InstructionData::Return { value: None },
        ];

        let module = empty_module();
        let mut frame = FrameInfo::new();
        let mut builder = DagBuilder::new(&func, &module);
        builder.build_block(b0, &mut frame).unwrap();
        let fi = frame.local_for_value(p).unwrap();
        assert_eq!(frame.object(fi).size, 4 * 4 * 5);
    }
}
