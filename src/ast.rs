// ast.rs - Parsed program structure

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal number: 42, -1.5
    Number(f64),

    /// Call of a built-in or previously defined word
    WordCall(String),

    /// Read of a local bound by the enclosing definition
    LocalRef(String),

    /// IF then-branch [ELSE else-branch] THEN
    /// An empty else-branch means there was no ELSE.
    Conditional {
        then_branch: Vec<Node>,
        else_branch: Vec<Node>,
    },

    /// BEGIN - opens a loop region
    LoopBegin,

    /// WHILE - leaves the innermost loop when the popped flag is zero
    LoopWhile,

    /// AGAIN - jumps back to the innermost BEGIN and closes the region
    LoopAgain,

    /// : name [recursive] [{ locals }] body ;
    Definition(Definition),

    /// RECURSE - call to the word being defined
    Recurse,

    /// ( ... )
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub recursive: bool,
    /// In declaration order; the last one binds to the top of the stack.
    pub locals: Vec<String>,
    pub body: Vec<Node>,
}
