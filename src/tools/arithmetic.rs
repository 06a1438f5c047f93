use crate::tools::registry::{schema_for_args, Tool};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Integer operands for a binary operation.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct BinaryArgs {
    /// Left operand
    pub a: i64,
    /// Right operand
    pub b: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
}

impl BinaryOp {
    /// `None` on overflow.
    pub fn apply(self, a: i64, b: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
        }
    }
}

pub struct ArithmeticTool {
    op: BinaryOp,
}

impl ArithmeticTool {
    pub fn new(op: BinaryOp) -> Self {
        Self { op }
    }
}

/// The three arithmetic tools.
pub fn all() -> Vec<Arc<dyn Tool>> {
    [BinaryOp::Add, BinaryOp::Subtract, BinaryOp::Multiply]
        .into_iter()
        .map(|op| Arc::new(ArithmeticTool::new(op)) as Arc<dyn Tool>)
        .collect()
}

#[async_trait]
impl Tool for ArithmeticTool {
    fn name(&self) -> &str {
        match self.op {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
        }
    }

    fn description(&self) -> &str {
        match self.op {
            BinaryOp::Add => "This is an addition function that adds 2 numbers together",
            BinaryOp::Subtract => "Subtraction function",
            BinaryOp::Multiply => "Multiplication function",
        }
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<BinaryArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let BinaryArgs { a, b } = serde_json::from_value(args)
            .map_err(|e| AppError::Tool(format!("Invalid arguments for '{}': {}", self.name(), e)))?;

        self.op.apply(a, b).map(|r| json!(r)).ok_or_else(|| {
            AppError::Tool(format!("'{}' overflowed for a={}, b={}", self.name(), a, b))
        })
    }
}
