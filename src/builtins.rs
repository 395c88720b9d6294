// builtins.rs - Built-in words, generated once per session

use cranelift::prelude::*;

use crate::codegen::FunctionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Arithmetic
    Add,        // + ( a b -- a+b )
    Sub,        // - ( a b -- a-b )
    Mul,        // * ( a b -- a*b )
    Div,        // / ( a b -- a/b )
    Negate,     // NEGATE ( a -- -a )

    // Comparison, -1.0 for true and 0.0 for false
    Less,       // < ( a b -- flag )
    Greater,    // > ( a b -- flag )
    Equals,     // = ( a b -- flag )

    // Stack manipulation
    Dup,        // DUP ( a -- a a )
    Swap,       // SWAP ( a b -- b a )
    Drop,       // DROP ( a -- )
    Over,       // OVER ( a b -- a b a )
    Nip,        // NIP ( a b -- b )
    Tuck,       // TUCK ( a b -- b a b )
    Rot,        // ROT ( a b c -- b c a )

    // Output
    Dot,        // . ( a -- ) Print the top value
    DotS,       // .S ( -- ) Print the whole stack, top first
}

impl Builtin {
    pub const ALL: [Builtin; 17] = [
        Builtin::Add,
        Builtin::Sub,
        Builtin::Mul,
        Builtin::Div,
        Builtin::Negate,
        Builtin::Less,
        Builtin::Greater,
        Builtin::Equals,
        Builtin::Dup,
        Builtin::Swap,
        Builtin::Drop,
        Builtin::Over,
        Builtin::Nip,
        Builtin::Tuck,
        Builtin::Rot,
        Builtin::Dot,
        Builtin::DotS,
    ];

    /// Word the builtin is registered under.
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Add => "+",
            Builtin::Sub => "-",
            Builtin::Mul => "*",
            Builtin::Div => "/",
            Builtin::Negate => "negate",
            Builtin::Less => "<",
            Builtin::Greater => ">",
            Builtin::Equals => "=",
            Builtin::Dup => "dup",
            Builtin::Swap => "swap",
            Builtin::Drop => "drop",
            Builtin::Over => "over",
            Builtin::Nip => "nip",
            Builtin::Tuck => "tuck",
            Builtin::Rot => "rot",
            Builtin::Dot => ".",
            Builtin::DotS => ".s",
        }
    }

    /// Backend symbol of the generated function.
    pub fn symbol(&self) -> &'static str {
        match self {
            Builtin::Add => "add",
            Builtin::Sub => "sub",
            Builtin::Mul => "mul",
            Builtin::Div => "div",
            Builtin::Negate => "negate",
            Builtin::Less => "lt",
            Builtin::Greater => "gt",
            Builtin::Equals => "eq",
            Builtin::Dup => "dup",
            Builtin::Swap => "swap",
            Builtin::Drop => "drop",
            Builtin::Over => "over",
            Builtin::Nip => "nip",
            Builtin::Tuck => "tuck",
            Builtin::Rot => "rot",
            Builtin::Dot => "dot",
            Builtin::DotS => "dots",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.iter().copied().find(|b| b.name() == name)
    }

    /// Values the word consumes or inspects.
    pub fn depth(&self) -> usize {
        match self {
            Builtin::DotS => 0,
            Builtin::Negate | Builtin::Dup | Builtin::Drop | Builtin::Dot => 1,
            Builtin::Rot => 3,
            _ => 2,
        }
    }

    /// Emit the body. The caller adds the return.
    pub fn build(&self, state: &mut FunctionState) {
        state.require(self.depth());

        match self {
            Builtin::Add | Builtin::Sub | Builtin::Mul | Builtin::Div => {
                let b = state.pop_unchecked();
                let a = state.pop_unchecked();
                let result = match self {
                    Builtin::Add => state.builder.ins().fadd(a, b),
                    Builtin::Sub => state.builder.ins().fsub(a, b),
                    Builtin::Mul => state.builder.ins().fmul(a, b),
                    _ => state.builder.ins().fdiv(a, b),
                };
                state.push(result);
            }
            Builtin::Negate => {
                let head = state.head;
                let value = state.cell_value(head);
                let negated = state.builder.ins().fneg(value);
                state.set_cell_value(head, negated);
            }
            Builtin::Less | Builtin::Greater | Builtin::Equals => {
                let b = state.pop_unchecked();
                let a = state.pop_unchecked();
                let cc = match self {
                    Builtin::Less => FloatCC::UnorderedOrLessThan,
                    Builtin::Greater => FloatCC::UnorderedOrGreaterThan,
                    _ => FloatCC::Equal,
                };
                let cmp = state.builder.ins().fcmp(cc, a, b);
                // Forth truth: -1 for true, 0 for false
                let true_flag = state.builder.ins().f64const(-1.0);
                let false_flag = state.builder.ins().f64const(0.0);
                let flag = state.builder.ins().select(cmp, true_flag, false_flag);
                state.push(flag);
            }
            Builtin::Dup => {
                let head = state.head;
                let top = state.cell_value(head);
                state.push(top);
            }
            Builtin::Swap => {
                let head = state.head;
                let second = state.cell_next(head);
                let a = state.cell_value(second);
                let b = state.cell_value(head);
                state.set_cell_value(head, a);
                state.set_cell_value(second, b);
            }
            Builtin::Drop => {
                state.pop_unchecked();
            }
            Builtin::Over => {
                let head = state.head;
                let second = state.cell_next(head);
                let a = state.cell_value(second);
                state.push(a);
            }
            Builtin::Nip => {
                // Unlink the cell below the head
                let head = state.head;
                let second = state.cell_next(head);
                let rest = state.cell_next(second);
                state.set_cell_next(head, rest);
                state.free_cell(second);
            }
            Builtin::Tuck => {
                // head(b) -> second(a) -> rest  becomes  head(b) -> second(a) -> new(b) -> rest
                let head = state.head;
                let second = state.cell_next(head);
                let rest = state.cell_next(second);
                let b = state.cell_value(head);
                let cell = state.alloc_cell();
                state.set_cell_value(cell, b);
                state.set_cell_next(cell, rest);
                state.set_cell_next(second, cell);
            }
            Builtin::Rot => {
                let head = state.head;
                let second = state.cell_next(head);
                let third = state.cell_next(second);
                let a = state.cell_value(third);
                let b = state.cell_value(second);
                let c = state.cell_value(head);
                state.set_cell_value(head, a);
                state.set_cell_value(second, c);
                state.set_cell_value(third, b);
            }
            Builtin::Dot => {
                let value = state.pop_unchecked();
                state.print(value);
            }
            Builtin::DotS => state.print_all(),
        }
    }
}
