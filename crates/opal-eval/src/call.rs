//! Function call machinery
//!
//! Resolves the callee unit by name, loading it from the library
//! collaborator on demand, binds arguments positionally into a fresh
//! context, runs the callee on the shared heap, and propagates the result
//! register back into the caller's frame.

use crate::context::Context;
use crate::interp::{Abort, Frame, Interp};
use opal_ir::{RegId, Unit, UnitKind};
use std::sync::Arc;
use tracing::debug;

impl<'a> Interp<'a> {
    pub(crate) fn op_fcall(
        &mut self,
        frame: &mut Frame,
        result: RegId,
        func: &str,
        args: &[RegId],
    ) -> Result<(), Abort> {
        let mut unit = self.registry.find(func);
        if unit.is_none() && self.flags.lower {
            unit = self.load_unit(func);
        }
        let Some(unit) = unit else {
            return Err(self.fail_warn(format!(
                "function call to {} prevents constant folding",
                func
            )));
        };

        let Some(mut ctx) = Context::new(unit, &mut self.heap) else {
            return Err(self.fail_warn(
                "evaluation heap exhaustion prevents constant folding".to_string(),
            ));
        };
        for (i, arg) in args.iter().enumerate() {
            ctx.regs[i] = Self::read(frame, *arg).clone();
        }

        let mut callee = Frame::new(ctx);
        let saved = self.flags;
        self.flags.bounds = true;
        let outcome = self.run(&mut callee);
        self.flags = saved;
        outcome?;

        let Some(ret) = callee.result else {
            return Err(self.fatal(format!("function {} did not return a value", func)));
        };
        let value = callee.ctx.regs[ret.0 as usize].clone();

        debug!(func, %value, "call returned");
        if self.flags.verbose {
            self.diags.note_at(
                &self.loc,
                format!("{} (in {}) returned {}", func, self.origin, value),
            );
        }
        Self::write(frame, result, value);
        Ok(())
    }

    /// Ask the library collaborator for the design unit containing `func`
    /// and register everything it serves. Packages pull in their body
    /// unit as well.
    fn load_unit(&mut self, func: &str) -> Option<Arc<Unit>> {
        let (unit_name, _) = func.rsplit_once('.')?;
        let (lib_name, rest) = unit_name.split_once('.')?;
        if rest.is_empty() {
            return None;
        }

        let source = self.source.as_mut()?;
        let units = source.load(lib_name, unit_name)?;
        if self.flags.verbose {
            self.diags
                .note_at(&self.loc, format!("loading {}", unit_name));
        }

        let mut is_package = false;
        for unit in units {
            if unit.name == unit_name && unit.kind == UnitKind::Package {
                is_package = true;
            }
            self.registry.insert(unit);
        }

        if is_package {
            let body_name = format!("{}-body", unit_name);
            if let Some(source) = self.source.as_mut() {
                if let Some(body) = source.load(lib_name, &body_name) {
                    for unit in body {
                        self.registry.insert(unit);
                    }
                }
            }
        }

        self.registry.find(func)
    }
}
