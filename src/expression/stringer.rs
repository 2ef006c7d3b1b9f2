//! Renders expressions back to query text.

use std::fmt;

use crate::error::ExprResult;
use crate::value::Value;

use super::ast::{
    BinaryOperator, Comprehension, ComprehensionKind, Expression, FieldName, FunctionCall,
    Identifier, UnaryOperator,
};
use super::bindings::Binding;
use super::like::Like;
use super::subquery::Subquery;
use super::visitor::Visitor;

pub struct Stringer;

impl Stringer {
    pub fn format(expr: &Expression) -> String {
        // Stringer never fails
        expr.accept(&mut Stringer).unwrap_or_default()
    }

    fn join(&mut self, exprs: &[Expression], sep: &str) -> ExprResult<String> {
        let parts = exprs
            .iter()
            .map(|e| e.accept(self))
            .collect::<ExprResult<Vec<_>>>()?;
        Ok(parts.join(sep))
    }

    fn binding(&mut self, binding: &Binding) -> ExprResult<String> {
        let source = binding.expression.accept(self)?;
        Ok(match &binding.name_variable {
            Some(name) => format!("{}:{} in {}", quote(name), quote(&binding.variable), source),
            None => format!("{} in {}", quote(&binding.variable), source),
        })
    }
}

fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

impl Visitor for Stringer {
    type Output = String;

    fn visit_constant(&mut self, value: &Value) -> ExprResult<String> {
        Ok(match value {
            Value::Missing => "missing".to_string(),
            other => other.to_string(),
        })
    }

    fn visit_identifier(&mut self, ident: &Identifier) -> ExprResult<String> {
        let mut s = quote(&ident.name);
        if ident.case_insensitive {
            s.push('i');
        }
        Ok(s)
    }

    fn visit_self(&mut self) -> ExprResult<String> {
        Ok("self".to_string())
    }

    fn visit_field(&mut self, base: &Expression, name: &FieldName) -> ExprResult<String> {
        let mut s = format!("{}.{}", base.accept(self)?, quote(&name.name));
        if name.case_insensitive {
            s.push('i');
        }
        Ok(s)
    }

    fn visit_element(&mut self, base: &Expression, index: &Expression) -> ExprResult<String> {
        Ok(format!("{}[{}]", base.accept(self)?, index.accept(self)?))
    }

    fn visit_array_construct(&mut self, elements: &[Expression]) -> ExprResult<String> {
        Ok(format!("[{}]", self.join(elements, ", ")?))
    }

    fn visit_object_construct(&mut self, members: &[(String, Expression)]) -> ExprResult<String> {
        let mut parts = Vec::with_capacity(members.len());
        for (name, expr) in members {
            let key = serde_json::to_string(name).unwrap_or_default();
            parts.push(format!("{}: {}", key, expr.accept(self)?));
        }
        Ok(format!("{{{}}}", parts.join(", ")))
    }

    fn visit_binary(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> ExprResult<String> {
        Ok(format!(
            "({} {} {})",
            left.accept(self)?,
            op.symbol(),
            right.accept(self)?
        ))
    }

    fn visit_unary(&mut self, op: UnaryOperator, operand: &Expression) -> ExprResult<String> {
        let inner = operand.accept(self)?;
        Ok(match op {
            UnaryOperator::Not => format!("(not {})", inner),
            UnaryOperator::Negate => format!("(-{})", inner),
            UnaryOperator::IsMissing => format!("({} is missing)", inner),
            UnaryOperator::IsNotMissing => format!("({} is not missing)", inner),
            UnaryOperator::IsNull => format!("({} is null)", inner),
            UnaryOperator::IsNotNull => format!("({} is not null)", inner),
            UnaryOperator::IsValued => format!("({} is valued)", inner),
            UnaryOperator::IsNotValued => format!("({} is not valued)", inner),
        })
    }

    fn visit_and(&mut self, terms: &[Expression]) -> ExprResult<String> {
        Ok(format!("({})", self.join(terms, " and ")?))
    }

    fn visit_or(&mut self, terms: &[Expression]) -> ExprResult<String> {
        Ok(format!("({})", self.join(terms, " or ")?))
    }

    fn visit_like(&mut self, like: &Like) -> ExprResult<String> {
        let mut s = format!(
            "({} like {}",
            like.first().accept(self)?,
            like.pattern().accept(self)?
        );
        if let Some(escape) = like.escape() {
            s.push_str(" escape ");
            s.push_str(&escape.accept(self)?);
        }
        s.push(')');
        Ok(s)
    }

    fn visit_between(
        &mut self,
        item: &Expression,
        low: &Expression,
        high: &Expression,
    ) -> ExprResult<String> {
        Ok(format!(
            "({} between {} and {})",
            item.accept(self)?,
            low.accept(self)?,
            high.accept(self)?
        ))
    }

    fn visit_case(
        &mut self,
        operand: Option<&Expression>,
        when_clauses: &[(Expression, Expression)],
        else_clause: Option<&Expression>,
    ) -> ExprResult<String> {
        let mut s = String::from("case");
        if let Some(operand) = operand {
            s.push(' ');
            s.push_str(&operand.accept(self)?);
        }
        for (when, then) in when_clauses {
            s.push_str(&format!(" when {} then {}", when.accept(self)?, then.accept(self)?));
        }
        if let Some(e) = else_clause {
            s.push_str(&format!(" else {}", e.accept(self)?));
        }
        s.push_str(" end");
        Ok(s)
    }

    fn visit_comprehension(&mut self, c: &Comprehension) -> ExprResult<String> {
        let bindings = c
            .bindings
            .iter()
            .map(|b| self.binding(b))
            .collect::<ExprResult<Vec<_>>>()?
            .join(", ");
        let when = match &c.when {
            Some(w) => format!(" when {}", w.accept(self)?),
            None => String::new(),
        };
        let mapping = c.mapping.accept(self)?;
        Ok(match c.kind {
            ComprehensionKind::Any => format!("any {} satisfies {} end", bindings, mapping),
            ComprehensionKind::Every => format!("every {} satisfies {} end", bindings, mapping),
            ComprehensionKind::AnyEvery => {
                format!("any and every {} satisfies {} end", bindings, mapping)
            }
            ComprehensionKind::Array => format!("array {} for {}{} end", mapping, bindings, when),
            ComprehensionKind::First => format!("first {} for {}{} end", mapping, bindings, when),
            ComprehensionKind::Object => {
                let name = match &c.name_mapping {
                    Some(n) => n.accept(self)?,
                    None => "missing".to_string(),
                };
                format!("object {} : {} for {}{} end", name, mapping, bindings, when)
            }
        })
    }

    fn visit_exists(&mut self, operand: &Expression) -> ExprResult<String> {
        Ok(format!("(exists {})", operand.accept(self)?))
    }

    fn visit_function(&mut self, call: &FunctionCall) -> ExprResult<String> {
        Ok(format!(
            "{}({})",
            call.name().to_lowercase(),
            self.join(call.operands(), ", ")?
        ))
    }

    fn visit_subquery(&mut self, sq: &Subquery) -> ExprResult<String> {
        let mut s = format!(
            "(select raw {} from {} as {}",
            sq.projection().accept(self)?,
            sq.source().accept(self)?,
            quote(sq.alias())
        );
        if let Some(filter) = sq.filter() {
            s.push_str(" where ");
            s.push_str(&filter.accept(self)?);
        }
        s.push(')');
        Ok(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Stringer::format(self))
    }
}
