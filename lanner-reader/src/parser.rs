//! Parser for the lanner IR text format.

use crate::error::{Location, ParseResult};
use crate::lexer::{LexError, Lexer, LocatedToken, Token};
use lanner_codegen::ir::{
    BinaryOp, Block, FloatCC, Function, GlobalValue, GlobalVarData, InstructionData, IntCC,
    Module, Operand, Signature, Type, Value,
};
use std::collections::HashMap;
use std::str::FromStr;

/// Parse the text in `source` as a module.
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let mut parser = Parser::new(source);
    parser.parse_module()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token<'a>>,
    location: Location,
    module: Module,
    global_names: HashMap<String, GlobalValue>,
}

/// Per-function parsing state: label and value name resolution.
#[derive(Default)]
struct FunctionState {
    blocks: HashMap<String, Block>,
    values: HashMap<String, Value>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            lookahead: None,
            location: Location::default(),
            module: Module::new(),
            global_names: HashMap::new(),
        }
    }

    // -- token plumbing ---------------------------------------------------

    fn token(&mut self) -> ParseResult<Option<Token<'a>>> {
        if self.lookahead.is_none() {
            match self.lexer.next() {
                Some(Ok(LocatedToken { token, location })) => {
                    self.lookahead = Some(token);
                    self.location = location;
                }
                Some(Err(LexError { location })) => {
                    return err!(location, "invalid character");
                }
                None => {}
            }
        }
        Ok(self.lookahead)
    }

    fn consume(&mut self) -> Token<'a> {
        self.lookahead.take().expect("consume without lookahead")
    }

    fn expect(&mut self, want: Token<'a>, context: &str) -> ParseResult<()> {
        match self.token()? {
            Some(token) if token == want => {
                self.consume();
                Ok(())
            }
            _ => err!(self.location, "expected {:?} {}", want, context),
        }
    }

    fn optional(&mut self, want: Token<'a>) -> ParseResult<bool> {
        if self.token()? == Some(want) {
            self.consume();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_identifier(&mut self, context: &str) -> ParseResult<&'a str> {
        match self.token()? {
            Some(Token::Identifier(text)) => {
                self.consume();
                Ok(text)
            }
            _ => err!(self.location, "expected {}", context),
        }
    }

    fn expect_sym(&mut self, context: &str) -> ParseResult<String> {
        match self.token()? {
            Some(Token::Sym(name)) => {
                self.consume();
                Ok(name.to_string())
            }
            _ => err!(self.location, "expected @name {}", context),
        }
    }

    fn expect_integer(&mut self, context: &str) -> ParseResult<i64> {
        match self.token()? {
            Some(Token::Integer(value)) => {
                self.consume();
                Ok(value)
            }
            _ => err!(self.location, "expected integer {}", context),
        }
    }

    fn expect_type(&mut self) -> ParseResult<Type> {
        let text = self.expect_identifier("a type")?;
        Type::from_str(text).or_else(|_| err!(self.location, "unknown type '{}'", text))
    }

    // -- module-level entities --------------------------------------------

    fn parse_module(&mut self) -> ParseResult<Module> {
        while let Some(token) = self.token()? {
            match token {
                Token::Identifier("global") => self.parse_global()?,
                Token::Identifier("declare") => self.parse_declare()?,
                Token::Identifier("define") => self.parse_function()?,
                _ => {
                    return err!(
                        self.location,
                        "expected 'global', 'declare' or 'define', got {:?}",
                        token
                    )
                }
            }
        }
        Ok(std::mem::take(&mut self.module))
    }

    /// Either `[4 x 5] i32` or a plain type.
    fn parse_pointee(&mut self) -> ParseResult<(Type, Vec<u32>)> {
        let mut dims = Vec::new();
        if self.optional(Token::LBracket)? {
            loop {
                let dim = self.expect_integer("array dimension")?;
                if dim <= 0 {
                    return err!(self.location, "array dimension must be positive");
                }
                dims.push(dim as u32);
                match self.token()? {
                    Some(Token::Identifier("x")) => {
                        self.consume();
                    }
                    Some(Token::RBracket) => break,
                    _ => return err!(self.location, "expected 'x' or ']' in array dimensions"),
                }
            }
            self.expect(Token::RBracket, "after array dimensions")?;
        }
        let ty = self.expect_type()?;
        Ok((ty, dims))
    }

    /// `global @name : [dims] ty [= init]`
    fn parse_global(&mut self) -> ParseResult<()> {
        self.consume();
        let name = self.expect_sym("naming the global")?;
        self.expect(Token::Colon, "after the global's name")?;
        let (ty, dims) = self.parse_pointee()?;

        let mut init = Vec::new();
        if self.optional(Token::Equal)? {
            if self.optional(Token::LBrace)? {
                while self.token()? != Some(Token::RBrace) {
                    init.push(self.parse_init_value(ty)?);
                    if !self.optional(Token::Comma)? {
                        break;
                    }
                }
                self.expect(Token::RBrace, "closing the initializer list")?;
            } else {
                init.push(self.parse_init_value(ty)?);
            }
        }

        if self.global_names.contains_key(&name) {
            return err!(self.location, "duplicate global @{}", name);
        }
        let gv = self.module.globals.push(GlobalVarData {
            name: name.clone(),
            ty,
            dims,
            init,
        });
        self.global_names.insert(name, gv);
        Ok(())
    }

    /// One initializer element; floats are stored as their bit pattern.
    fn parse_init_value(&mut self, ty: Type) -> ParseResult<i64> {
        match self.token()? {
            Some(Token::Integer(value)) => {
                self.consume();
                Ok(value)
            }
            Some(Token::Float(value)) if ty.is_float() => {
                self.consume();
                Ok(i64::from(value.to_bits()))
            }
            _ => err!(self.location, "expected initializer value"),
        }
    }

    /// `declare ty @name(ty, ...)`
    fn parse_declare(&mut self) -> ParseResult<()> {
        self.consume();
        let ret = self.expect_type()?;
        let name = self.expect_sym("naming the function")?;
        self.expect(Token::LPar, "before the parameter types")?;
        let mut params = Vec::new();
        while self.token()? != Some(Token::RPar) {
            params.push(self.expect_type()?);
            if !self.optional(Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RPar, "after the parameter types")?;
        self.module.declarations.push(Signature { name, ret, params });
        Ok(())
    }

    /// `define ty @name(ty %p, ...) { blocks }`
    fn parse_function(&mut self) -> ParseResult<()> {
        self.consume();
        let ret = self.expect_type()?;
        let name = self.expect_sym("naming the function")?;

        let mut func = Function::new(Signature {
            name,
            ret,
            params: Vec::new(),
        });
        let mut state = FunctionState::default();

        self.expect(Token::LPar, "before the parameters")?;
        while self.token()? != Some(Token::RPar) {
            let ty = self.expect_type()?;
            match self.token()? {
                Some(Token::Value(pname)) => {
                    self.consume();
                    let value = func.make_value(ty);
                    state.values.insert(pname.to_string(), value);
                    func.sig.params.push(ty);
                    func.params.push(value);
                }
                _ => return err!(self.location, "expected parameter name"),
            }
            if !self.optional(Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RPar, "after the parameters")?;
        self.expect(Token::LBrace, "before the function body")?;

        while self.token()? != Some(Token::RBrace) {
            self.parse_block(&mut func, &mut state)?;
        }
        self.expect(Token::RBrace, "after the function body")?;

        self.module.functions.push(func);
        Ok(())
    }

    // -- function bodies --------------------------------------------------

    fn block_ref(
        &mut self,
        func: &mut Function,
        state: &mut FunctionState,
        name: &str,
    ) -> Block {
        if let Some(&block) = state.blocks.get(name) {
            return block;
        }
        let block = func.make_block();
        state.blocks.insert(name.to_string(), block);
        block
    }

    /// `label %name` as used by branches.
    fn parse_label_ref(
        &mut self,
        func: &mut Function,
        state: &mut FunctionState,
    ) -> ParseResult<Block> {
        match self.token()? {
            Some(Token::Identifier("label")) => {
                self.consume();
            }
            _ => return err!(self.location, "expected 'label'"),
        }
        match self.token()? {
            Some(Token::Value(name)) => {
                self.consume();
                Ok(self.block_ref(func, state, name))
            }
            _ => err!(self.location, "expected label name"),
        }
    }

    /// `%name:` and everything through its terminator.
    fn parse_block(&mut self, func: &mut Function, state: &mut FunctionState) -> ParseResult<()> {
        let label = self.expect_identifier("a block label")?.to_string();
        self.expect(Token::Colon, "after the block label")?;
        let block = self.block_ref(func, state, &label);
        if !func.blocks[block].insts.is_empty() {
            return err!(self.location, "redefinition of block {}", label);
        }

        loop {
            let inst = self.parse_instruction(func, state)?;
            let done = inst.is_terminator();
            func.blocks[block].insts.push(inst);
            if done {
                break;
            }
        }
        Ok(())
    }

    /// A value used as an operand; minted on first (forward) mention.
    fn value_ref(&mut self, func: &mut Function, state: &mut FunctionState, name: &str) -> Value {
        if let Some(&value) = state.values.get(name) {
            return value;
        }
        // Forward reference; the type is recorded when the definition is
        // parsed.
        let value = func.make_value(Type::Void);
        state.values.insert(name.to_string(), value);
        value
    }

    /// A defined value; records its type.
    fn value_def(
        &mut self,
        func: &mut Function,
        state: &mut FunctionState,
        name: &str,
        ty: Type,
    ) -> Value {
        if let Some(&value) = state.values.get(name) {
            func.value_types[value] = ty;
            return value;
        }
        let value = func.make_value(ty);
        state.values.insert(name.to_string(), value);
        value
    }

    fn parse_operand(
        &mut self,
        func: &mut Function,
        state: &mut FunctionState,
    ) -> ParseResult<Operand> {
        match self.token()? {
            Some(Token::Value(name)) => {
                self.consume();
                Ok(Operand::Value(self.value_ref(func, state, name)))
            }
            Some(Token::Integer(value)) => {
                self.consume();
                if i32::try_from(value).is_err() {
                    return err!(self.location, "integer immediate {} out of range", value);
                }
                Ok(Operand::Iconst(value as i32))
            }
            Some(Token::Float(value)) => {
                self.consume();
                Ok(Operand::Fconst(value))
            }
            Some(Token::Sym(name)) => {
                self.consume();
                match self.global_names.get(name) {
                    Some(&gv) => Ok(Operand::Global(gv)),
                    None => err!(self.location, "reference to undefined global @{}", name),
                }
            }
            _ => err!(self.location, "expected an operand"),
        }
    }

    fn parse_instruction(
        &mut self,
        func: &mut Function,
        state: &mut FunctionState,
    ) -> ParseResult<InstructionData> {
        match self.token()? {
            Some(Token::Value(name)) => {
                self.consume();
                self.expect(Token::Equal, "after the result name")?;
                self.parse_value_def(func, state, name)
            }
            Some(Token::Identifier("store")) => {
                self.consume();
                let ty = self.expect_type()?;
                let value = self.parse_operand(func, state)?;
                self.expect(Token::Comma, "after the stored value")?;
                self.expect(Token::Identifier("ptr"), "before the address")?;
                let ptr = self.parse_operand(func, state)?;
                Ok(InstructionData::Store { ty, value, ptr })
            }
            Some(Token::Identifier("br")) => {
                self.consume();
                if self.token()? == Some(Token::Identifier("label")) {
                    let dest = self.parse_label_ref(func, state)?;
                    Ok(InstructionData::Branch { dest })
                } else {
                    self.expect(Token::Identifier("i1"), "before the branch condition")?;
                    let cond = self.parse_operand(func, state)?;
                    self.expect(Token::Comma, "after the branch condition")?;
                    let then_dest = self.parse_label_ref(func, state)?;
                    self.expect(Token::Comma, "between branch targets")?;
                    let else_dest = self.parse_label_ref(func, state)?;
                    Ok(InstructionData::BranchCond {
                        cond,
                        then_dest,
                        else_dest,
                    })
                }
            }
            Some(Token::Identifier("ret")) => {
                self.consume();
                let ty = self.expect_type()?;
                if ty == Type::Void {
                    Ok(InstructionData::Return { value: None })
                } else {
                    let operand = self.parse_operand(func, state)?;
                    Ok(InstructionData::Return {
                        value: Some((ty, operand)),
                    })
                }
            }
            Some(Token::Identifier("call")) => {
                self.consume();
                self.parse_call(func, state, None)
            }
            _ => err!(self.location, "expected an instruction"),
        }
    }

    fn parse_value_def(
        &mut self,
        func: &mut Function,
        state: &mut FunctionState,
        name: &str,
    ) -> ParseResult<InstructionData> {
        let opcode = self.expect_identifier("an opcode")?;
        match opcode {
            "alloca" => {
                let (ty, dims) = self.parse_pointee()?;
                let result = self.value_def(func, state, name, Type::Ptr);
                Ok(InstructionData::Alloca { result, ty, dims })
            }
            "load" => {
                let ty = self.expect_type()?;
                self.expect(Token::Comma, "after the loaded type")?;
                self.expect(Token::Identifier("ptr"), "before the address")?;
                let ptr = self.parse_operand(func, state)?;
                let result = self.value_def(func, state, name, ty);
                Ok(InstructionData::Load { result, ty, ptr })
            }
            "icmp" => {
                let cond_text = self.expect_identifier("a condition code")?;
                let cond = IntCC::from_str(cond_text)
                    .or_else(|_| err!(self.location, "unknown condition '{}'", cond_text))?;
                let _ty = self.expect_type()?;
                let lhs = self.parse_operand(func, state)?;
                self.expect(Token::Comma, "between compare operands")?;
                let rhs = self.parse_operand(func, state)?;
                let result = self.value_def(func, state, name, Type::I1);
                Ok(InstructionData::IntCompare {
                    cond,
                    result,
                    lhs,
                    rhs,
                })
            }
            "fcmp" => {
                let cond_text = self.expect_identifier("a condition code")?;
                let cond = FloatCC::from_str(cond_text)
                    .or_else(|_| err!(self.location, "unknown condition '{}'", cond_text))?;
                let _ty = self.expect_type()?;
                let lhs = self.parse_operand(func, state)?;
                self.expect(Token::Comma, "between compare operands")?;
                let rhs = self.parse_operand(func, state)?;
                let result = self.value_def(func, state, name, Type::I1);
                Ok(InstructionData::FloatCompare {
                    cond,
                    result,
                    lhs,
                    rhs,
                })
            }
            "phi" => {
                let ty = self.expect_type()?;
                let mut args = Vec::new();
                loop {
                    self.expect(Token::LBracket, "before a phi incoming pair")?;
                    let value = self.parse_operand(func, state)?;
                    self.expect(Token::Comma, "in a phi incoming pair")?;
                    let block = match self.token()? {
                        Some(Token::Value(label)) => {
                            self.consume();
                            self.block_ref(func, state, label)
                        }
                        _ => return err!(self.location, "expected a phi incoming label"),
                    };
                    self.expect(Token::RBracket, "after a phi incoming pair")?;
                    args.push((block, value));
                    if !self.optional(Token::Comma)? {
                        break;
                    }
                }
                let result = self.value_def(func, state, name, ty);
                Ok(InstructionData::Phi { result, ty, args })
            }
            "call" => self.parse_call(func, state, Some(name)),
            "getelementptr" => {
                let (elem_ty, dims) = self.parse_pointee()?;
                self.expect(Token::Comma, "after the element type")?;
                self.expect(Token::Identifier("ptr"), "before the base address")?;
                let base = self.parse_operand(func, state)?;
                let mut indices = Vec::new();
                while self.optional(Token::Comma)? {
                    let _ty = self.expect_type()?;
                    indices.push(self.parse_operand(func, state)?);
                }
                let result = self.value_def(func, state, name, Type::Ptr);
                Ok(InstructionData::GetElementPtr {
                    result,
                    elem_ty,
                    base,
                    dims,
                    indices,
                })
            }
            "zext" => {
                let from = self.expect_type()?;
                let arg = self.parse_operand(func, state)?;
                self.expect(Token::Identifier("to"), "in zext")?;
                let to = self.expect_type()?;
                let result = self.value_def(func, state, name, to);
                Ok(InstructionData::Zext {
                    result,
                    from,
                    to,
                    arg,
                })
            }
            "sitofp" => {
                let _from = self.expect_type()?;
                let arg = self.parse_operand(func, state)?;
                self.expect(Token::Identifier("to"), "in sitofp")?;
                let _to = self.expect_type()?;
                let result = self.value_def(func, state, name, Type::F32);
                Ok(InstructionData::SiToFp { result, arg })
            }
            "fptosi" => {
                let _from = self.expect_type()?;
                let arg = self.parse_operand(func, state)?;
                self.expect(Token::Identifier("to"), "in fptosi")?;
                let _to = self.expect_type()?;
                let result = self.value_def(func, state, name, Type::I32);
                Ok(InstructionData::FpToSi { result, arg })
            }
            mnemonic => {
                let Some(op) = binary_op_from_mnemonic(mnemonic) else {
                    return err!(self.location, "unknown opcode '{}'", mnemonic);
                };
                let ty = self.expect_type()?;
                let lhs = self.parse_operand(func, state)?;
                self.expect(Token::Comma, "between operands")?;
                let rhs = self.parse_operand(func, state)?;
                let result = self.value_def(func, state, name, ty);
                Ok(InstructionData::Binary {
                    op,
                    ty,
                    result,
                    lhs,
                    rhs,
                })
            }
        }
    }

    /// The tail of a call: `ty @callee(ty arg, ...)`.
    fn parse_call(
        &mut self,
        func: &mut Function,
        state: &mut FunctionState,
        result_name: Option<&str>,
    ) -> ParseResult<InstructionData> {
        let ret_ty = self.expect_type()?;
        let callee = self.expect_sym("naming the callee")?;
        self.expect(Token::LPar, "before the arguments")?;
        let mut args = Vec::new();
        while self.token()? != Some(Token::RPar) {
            let ty = self.expect_type()?;
            let operand = self.parse_operand(func, state)?;
            args.push((ty, operand));
            if !self.optional(Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RPar, "after the arguments")?;

        let result = match result_name {
            Some(name) => {
                if ret_ty == Type::Void {
                    return err!(self.location, "void call cannot define a result");
                }
                Some(self.value_def(func, state, name, ret_ty))
            }
            None => None,
        };
        Ok(InstructionData::Call {
            result,
            ret_ty,
            callee,
            args,
        })
    }
}

fn binary_op_from_mnemonic(text: &str) -> Option<BinaryOp> {
    Some(match text {
        "add" => BinaryOp::Add,
        "sub" => BinaryOp::Sub,
        "mul" => BinaryOp::Mul,
        "sdiv" => BinaryOp::Div,
        "srem" => BinaryOp::Rem,
        "shl" => BinaryOp::Shl,
        "ashr" => BinaryOp::Ashr,
        "lshr" => BinaryOp::Lshr,
        "and" => BinaryOp::And,
        "or" => BinaryOp::Or,
        "xor" => BinaryOp::Xor,
        "fadd" => BinaryOp::Fadd,
        "fsub" => BinaryOp::Fsub,
        "fmul" => BinaryOp::Fmul,
        "fdiv" => BinaryOp::Fdiv,
        _ => return None,
    })
}
