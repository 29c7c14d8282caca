//! Tree-walking interpreter over compiled functions

use std::rc::Rc;

use framejit_ir::{free_variables, BinaryOp, Literal, Node, NodeKind, UnaryOp, Variable};

use crate::closure::Closure;
use crate::compile::{Function, Slot};
use crate::error::RuntimeError;
use crate::quote::QuoteValue;
use crate::value::{new_cell, Cell, Frame, Value};
use crate::variables::RuntimeVariables;

/// Deepest chain of nested calls the interpreter accepts
pub const MAX_CALL_DEPTH: usize = 128;

/// Abrupt completion of an evaluation
#[derive(Debug)]
pub(crate) enum Unwind {
    /// Value raised by `throw`; catchable
    Throw(Value),
    /// Executor failure; never caught
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Unwind::Error(err)
    }
}

pub(crate) struct Returned {
    pub value: Value,
    /// Final values of by-reference parameters, by argument position
    pub out: Vec<(usize, Value)>,
}

/// Call `closure`. By-reference parameters are copied in from `args` and
/// their final values returned for the caller to copy out.
pub(crate) fn call(closure: &Closure, args: Vec<Value>, depth: usize) -> Result<Returned, Unwind> {
    if depth > MAX_CALL_DEPTH {
        return Err(RuntimeError::CallDepthExceeded { limit: MAX_CALL_DEPTH }.into());
    }
    if args.len() != closure.arity() {
        return Err(RuntimeError::ArityMismatch {
            expected: closure.arity(),
            found: args.len(),
        }
        .into());
    }

    let function = closure.function();
    let mut activation = Activation {
        function,
        cells: (0..function.local_count).map(|_| new_cell(Value::Unit)).collect(),
        captured: closure.captured(),
        depth,
    };

    let offset = usize::from(closure.frame().is_some());
    let values = closure.frame().cloned().into_iter().chain(args);
    for (param, value) in function.params.iter().zip(values) {
        activation.bind(param, value)?;
    }

    let value = activation.eval(&function.body)?;
    let mut out = Vec::new();
    for (index, param) in function.params.iter().enumerate().skip(offset) {
        if param.is_by_ref() {
            out.push((index - offset, activation.read(param)?));
        }
    }
    Ok(Returned { value, out })
}

fn literal(literal: &Literal) -> Value {
    match literal {
        Literal::Unit => Value::Unit,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(x) => Value::Float(*x),
        Literal::String(s) => Value::string(s.as_str()),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left.equals(&right))),
        BinaryOp::Ne => return Ok(Value::Bool(!left.equals(&right))),
        _ => {}
    }

    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            Ok(match op {
                BinaryOp::Add => Value::Int(a.wrapping_add(b)),
                BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
                BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
                BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(RuntimeError::DivisionByZero),
                BinaryOp::Div => Value::Int(a.wrapping_div(b)),
                BinaryOp::Rem => Value::Int(a.wrapping_rem(b)),
                BinaryOp::Lt => Value::Bool(a < b),
                BinaryOp::Le => Value::Bool(a <= b),
                BinaryOp::Gt => Value::Bool(a > b),
                BinaryOp::Ge => Value::Bool(a >= b),
                BinaryOp::Eq | BinaryOp::Ne => unreachable!("handled above"),
            })
        }
        (Value::String(a), Value::String(b)) => match op {
            BinaryOp::Add => Ok(Value::string(format!("{}{}", a, b))),
            BinaryOp::Lt => Ok(Value::Bool(a < b)),
            BinaryOp::Le => Ok(Value::Bool(a <= b)),
            BinaryOp::Gt => Ok(Value::Bool(a > b)),
            BinaryOp::Ge => Ok(Value::Bool(a >= b)),
            _ => Err(RuntimeError::TypeMismatch {
                expected: "number",
                found: left.type_name(),
            }),
        },
        _ => {
            let (Some(a), Some(b)) = (number(&left), number(&right)) else {
                let found = if number(&left).is_none() { &left } else { &right };
                return Err(RuntimeError::TypeMismatch {
                    expected: "number",
                    found: found.type_name(),
                });
            };
            Ok(match op {
                BinaryOp::Add => Value::Float(a + b),
                BinaryOp::Sub => Value::Float(a - b),
                BinaryOp::Mul => Value::Float(a * b),
                BinaryOp::Div => Value::Float(a / b),
                BinaryOp::Rem => Value::Float(a % b),
                BinaryOp::Lt => Value::Bool(a < b),
                BinaryOp::Le => Value::Bool(a <= b),
                BinaryOp::Gt => Value::Bool(a > b),
                BinaryOp::Ge => Value::Bool(a >= b),
                BinaryOp::Eq | BinaryOp::Ne => unreachable!("handled above"),
            })
        }
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value, RuntimeError> {
    match (op, operand) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, other) => Err(RuntimeError::TypeMismatch {
            expected: "number",
            found: other.type_name(),
        }),
        (UnaryOp::Not, other) => Err(RuntimeError::TypeMismatch {
            expected: "bool",
            found: other.type_name(),
        }),
    }
}

/// Targets a by-reference argument can be copied back into
fn is_assignable(node: &Node) -> bool {
    matches!(
        node.kind(),
        NodeKind::Variable(_) | NodeKind::Field { .. } | NodeKind::BoxValue(_)
    )
}

struct Activation<'f> {
    function: &'f Function,
    cells: Vec<Cell>,
    captured: &'f [Cell],
    depth: usize,
}

impl<'f> Activation<'f> {
    fn slot_cell(&self, slot: Slot, variable: &Variable) -> Result<Cell, RuntimeError> {
        let cell = match slot {
            Slot::Local(i) => self.cells.get(i),
            Slot::Captured(i) => self.captured.get(i),
        };
        cell.cloned().ok_or_else(|| RuntimeError::UndeclaredVariable {
            name: variable.name().to_string(),
        })
    }

    fn cell(&self, variable: &Variable) -> Result<Cell, RuntimeError> {
        self.slot_cell(self.function.resolve(variable)?, variable)
    }

    fn read(&self, variable: &Variable) -> Result<Value, RuntimeError> {
        let cell = self.cell(variable)?;
        let value = cell.borrow().clone();
        Ok(value)
    }

    /// Give `variable` a fresh cell holding `value`. Closures created
    /// before keep the old cell.
    fn bind(&mut self, variable: &Variable, value: Value) -> Result<(), RuntimeError> {
        match self.function.resolve(variable)? {
            Slot::Local(i) => match self.cells.get_mut(i) {
                Some(cell) => {
                    *cell = new_cell(value);
                    Ok(())
                }
                None => Err(RuntimeError::UndeclaredVariable {
                    name: variable.name().to_string(),
                }),
            },
            Slot::Captured(_) => {
                *self.cell(variable)?.borrow_mut() = value;
                Ok(())
            }
        }
    }

    fn cells_of(&self, variables: &[Variable]) -> Result<Vec<Cell>, RuntimeError> {
        variables.iter().map(|v| self.cell(v)).collect()
    }

    fn assign(&mut self, target: &Node, value: Value) -> Result<(), Unwind> {
        match target.kind() {
            NodeKind::Variable(v) => {
                *self.cell(v)?.borrow_mut() = value;
                Ok(())
            }
            NodeKind::Field { frame, slot } => {
                let frame = self.eval(frame)?;
                frame.as_frame()?.set(*slot, value)?;
                Ok(())
            }
            NodeKind::BoxValue(cell) => {
                let cell = self.eval(cell)?;
                *cell.as_cell()?.borrow_mut() = value;
                Ok(())
            }
            _ => Err(RuntimeError::UnexpectedNode {
                kind: target.kind_name(),
            }
            .into()),
        }
    }

    fn eval(&mut self, node: &Node) -> Result<Value, Unwind> {
        match node.kind() {
            NodeKind::Constant(lit) => Ok(literal(lit)),
            NodeKind::Variable(v) => Ok(self.read(v)?),
            NodeKind::Default => Ok(Value::default_of(node.ty())),
            NodeKind::Lambda { .. } => {
                let nested = self
                    .function
                    .nested
                    .get(&node.id())
                    .ok_or(RuntimeError::UnexpectedNode { kind: "lambda" })?;
                let captured = nested
                    .function
                    .captures
                    .iter()
                    .zip(&nested.sources)
                    .map(|(v, slot)| self.slot_cell(*slot, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Function(Rc::new(Closure::new(nested.function.clone(), captured))))
            }
            NodeKind::Block { variables, body } => {
                for v in variables {
                    self.bind(v, Value::default_of(v.ty()))?;
                }
                let mut result = Value::Unit;
                for expr in body {
                    result = self.eval(expr)?;
                }
                Ok(result)
            }
            NodeKind::Try {
                body,
                handlers,
                finally,
            } => {
                let mut result = self.eval(body);
                if let Err(Unwind::Throw(exception)) = &result {
                    let exception = exception.clone();
                    for handler in handlers {
                        match self.handle(handler, &exception) {
                            Ok(None) => continue,
                            Ok(Some(value)) => result = Ok(value),
                            Err(unwind) => result = Err(unwind),
                        }
                        break;
                    }
                }
                if let Some(finally) = finally {
                    self.eval(finally)?;
                }
                result
            }
            NodeKind::Throw(value) => {
                let value = self.eval(value)?;
                log::trace!("throw {:?}", value);
                Err(Unwind::Throw(value))
            }
            NodeKind::Quote(operand) => {
                let free = free_variables(operand);
                let cells = self.cells_of(&free)?;
                let quote = QuoteValue::from_cells(operand.clone(), free.into_iter().zip(cells).collect());
                Ok(Value::Quote(Rc::new(quote)))
            }
            NodeKind::RuntimeVariables(variables) => {
                let cells = self.cells_of(variables)?;
                Ok(Value::RuntimeVariables(Rc::new(RuntimeVariables::new(cells))))
            }
            NodeKind::Invoke { callee, args } => {
                let callee = self.eval(callee)?;
                let closure = callee.as_function()?.clone();
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;

                let returned = call(&closure, values, self.depth + 1)?;
                for (index, value) in returned.out {
                    if let Some(arg) = args.get(index).filter(|arg| is_assignable(arg)) {
                        self.assign(arg, value)?;
                    }
                }
                Ok(returned.value)
            }
            NodeKind::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary(*op, left, right)?)
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                Ok(unary(*op, operand)?)
            }
            NodeKind::Conditional {
                test,
                then,
                otherwise,
            } => {
                let test = self.eval(test)?.as_bool()?;
                match (test, otherwise) {
                    (true, Some(_)) => self.eval(then),
                    (true, None) => self.eval(then).map(|_| Value::Unit),
                    (false, Some(otherwise)) => self.eval(otherwise),
                    (false, None) => Ok(Value::Unit),
                }
            }
            NodeKind::Loop { test, body } => {
                while self.eval(test)?.as_bool()? {
                    self.eval(body)?;
                }
                Ok(Value::Unit)
            }
            NodeKind::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
            NodeKind::NewFrame(layout) => Ok(Value::Frame(Frame::new(layout.clone()))),
            NodeKind::Field { frame, slot } => {
                let frame = self.eval(frame)?;
                Ok(frame.as_frame()?.get(*slot)?)
            }
            NodeKind::NewBox(value) => {
                let value = self.eval(value)?;
                Ok(Value::Box(new_cell(value)))
            }
            NodeKind::BoxValue(cell) => {
                let cell = self.eval(cell)?;
                let value = cell.as_cell()?.borrow().clone();
                Ok(value)
            }
            NodeKind::MaterializeThunk {
                table,
                index,
                thunk,
                frame,
            } => {
                let table = match self.eval(table)? {
                    Value::MethodTable(table) => table,
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "method-table",
                            found: other.type_name(),
                        }
                        .into())
                    }
                };
                let frame = self.eval(frame)?;
                Ok(table.materialize(*index, thunk, frame)?)
            }
            NodeKind::RuntimeVariablesView { frame, slots } => {
                let frame = self.eval(frame)?;
                let view = if slots.is_empty() {
                    RuntimeVariables::new(Vec::new())
                } else {
                    RuntimeVariables::from_frame(frame.as_frame()?, slots)?
                };
                Ok(Value::RuntimeVariables(Rc::new(view)))
            }
            NodeKind::FramedQuote {
                operand,
                frame,
                layout,
            } => {
                let frame = self.eval(frame)?;
                let quote = QuoteValue::from_frame(operand.clone(), &frame, layout.as_ref())?;
                Ok(Value::Quote(Rc::new(quote)))
            }
            NodeKind::Catch { .. }
            | NodeKind::CompoundAssign { .. }
            | NodeKind::Coalesce { .. }
            | NodeKind::Logical { .. } => Err(RuntimeError::UnexpectedNode {
                kind: node.kind_name(),
            }
            .into()),
        }
    }

    /// Run `handler` for `exception`. `None` when the handler's type or
    /// filter rejects it.
    fn handle(&mut self, handler: &Node, exception: &Value) -> Result<Option<Value>, Unwind> {
        let NodeKind::Catch {
            variable,
            filter,
            body,
        } = handler.kind()
        else {
            return Err(RuntimeError::UnexpectedNode {
                kind: handler.kind_name(),
            }
            .into());
        };

        if let Some(variable) = variable {
            if !exception.has_type(variable.ty()) {
                return Ok(None);
            }
            self.bind(variable, exception.clone())?;
        }
        if let Some(filter) = filter {
            if !self.eval(filter)?.as_bool()? {
                return Ok(None);
            }
        }
        self.eval(body).map(Some)
    }
}
