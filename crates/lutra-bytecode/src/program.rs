//! Program structure: units, classes, functions and blocks

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::instruction::{BytecodeVec, Instruction};
use crate::operand::{BlockId, LitstrId};

/// A basic block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Instructions, ending in a terminal one for well-formed code
    pub instructions: BytecodeVec,
}

impl Block {
    /// Create a block from its instructions
    pub fn new(instructions: BytecodeVec) -> Self {
        Self { instructions }
    }
}

/// A function or method body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Func {
    /// Function name
    pub name: String,
    /// Blocks, indexed by [`BlockId`]
    pub blocks: Vec<Block>,
}

impl Func {
    /// Create a new function builder
    pub fn builder(name: impl Into<String>) -> FuncBuilder {
        FuncBuilder::new(name)
    }

    /// Get a block by id
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index() as usize)
    }
}

/// Builder for creating functions
#[derive(Debug)]
pub struct FuncBuilder {
    name: String,
    blocks: Vec<Block>,
}

impl FuncBuilder {
    /// Create a new function builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
        }
    }

    /// Add a block and return its id
    pub fn add_block(&mut self, instructions: impl IntoIterator<Item = Instruction>) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(Block::new(instructions.into_iter().collect()));
        id
    }

    /// Add a block (chaining form)
    pub fn block(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.add_block(instructions);
        self
    }

    /// Build the function
    pub fn build(self) -> Func {
        Func {
            name: self.name,
            blocks: self.blocks,
        }
    }
}

/// A class and its methods
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    /// Class name
    pub name: String,
    /// Methods
    pub methods: Vec<Func>,
}

impl Class {
    /// Create a class with the given methods
    pub fn new(name: impl Into<String>, methods: Vec<Func>) -> Self {
        Self {
            name: name.into(),
            methods,
        }
    }
}

/// A compilation unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit name (usually the source path)
    pub name: String,
    /// Literal string table, indexed by [`LitstrId`]
    pub litstrs: Vec<String>,
    /// Classes defined in this unit
    pub classes: Vec<Class>,
    /// Free functions defined in this unit
    pub funcs: Vec<Func>,
}

impl Unit {
    /// Create a new unit builder
    pub fn builder(name: impl Into<String>) -> UnitBuilder {
        UnitBuilder::new(name)
    }

    /// Look up a literal string
    pub fn litstr(&self, id: LitstrId) -> Option<&str> {
        self.litstrs.get(id.index() as usize).map(String::as_str)
    }

    /// Every function body in the unit: class methods first, then free functions
    pub fn bodies(&self) -> impl Iterator<Item = &Func> {
        self.classes
            .iter()
            .flat_map(|c| c.methods.iter())
            .chain(self.funcs.iter())
    }

    /// Mutable form of [`Unit::bodies`]
    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Func> {
        self.classes
            .iter_mut()
            .flat_map(|c| c.methods.iter_mut())
            .chain(self.funcs.iter_mut())
    }
}

/// Builder for creating units
#[derive(Debug)]
pub struct UnitBuilder {
    name: String,
    litstrs: Vec<String>,
    interned: FxHashMap<String, LitstrId>,
    classes: Vec<Class>,
    funcs: Vec<Func>,
}

impl UnitBuilder {
    /// Create a new unit builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            litstrs: Vec::new(),
            interned: FxHashMap::default(),
            classes: Vec::new(),
            funcs: Vec::new(),
        }
    }

    /// Intern a literal string
    pub fn litstr(&mut self, s: &str) -> LitstrId {
        if let Some(&id) = self.interned.get(s) {
            return id;
        }
        let id = LitstrId::new(self.litstrs.len() as u32);
        self.litstrs.push(s.to_string());
        self.interned.insert(s.to_string(), id);
        id
    }

    /// Add a class
    pub fn class(mut self, class: Class) -> Self {
        self.classes.push(class);
        self
    }

    /// Add a free function
    pub fn func(mut self, func: Func) -> Self {
        self.funcs.push(func);
        self
    }

    /// Build the unit
    pub fn build(self) -> Unit {
        Unit {
            name: self.name,
            litstrs: self.litstrs,
            classes: self.classes,
            funcs: self.funcs,
        }
    }
}

/// A whole program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Units in load order
    pub units: Vec<Unit>,
}

impl Program {
    /// Create a program from its units
    pub fn new(units: Vec<Unit>) -> Self {
        Self { units }
    }

    /// Total number of blocks
    pub fn block_count(&self) -> usize {
        self.units
            .iter()
            .flat_map(Unit::bodies)
            .map(|f| f.blocks.len())
            .sum()
    }
}
