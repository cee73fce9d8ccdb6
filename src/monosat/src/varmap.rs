//! Bidirectional mapping between externally visible variable ids and
//! internal solver variables.
//!
//! Internal variables include auxiliaries introduced by CNF translation of
//! theory constraints; those have no external id. For every external id ever
//! handed out, `external(internal(e)) == e`.

use crate::clause::{Lit, VMap, Var};
use crate::errors::{check_name, Error, Result};
use fnv::FnvHashMap;

const NO_EXT: i32 = -1;

pub struct VarMap {
    ext2int: Vec<Var>,
    int2ext: VMap<i32>,
    names: FnvHashMap<String, Var>,
    name_of: VMap<String>,
    named: Vec<Var>,
}

impl VarMap {
    pub fn new() -> Self {
        Self {
            ext2int: vec![],
            int2ext: VMap::new(),
            names: FnvHashMap::default(),
            name_of: VMap::new(),
            named: vec![],
        }
    }

    /// Number of externally visible variables.
    pub fn n_external(&self) -> usize {
        self.ext2int.len()
    }

    /// Expose internal variable `v`, returning its external id.
    /// Idempotent: a variable already exposed keeps its id.
    pub fn expose(&mut self, v: Var) -> u32 {
        if let Some(&e) = self.int2ext.get(v) {
            if e != NO_EXT {
                return e as u32;
            }
        }
        let e = self.ext2int.len() as u32;
        self.ext2int.push(v);
        self.int2ext.insert(v, e as i32, NO_EXT);
        e
    }

    /// The internal variable for external id `e`.
    pub fn internal(&self, e: u32) -> Result<Var> {
        self.ext2int
            .get(e as usize)
            .copied()
            .ok_or_else(|| Error::domain(format!("variable {} is not allocated", e + 1)))
    }

    /// The external id of internal variable `v`, if it is exposed.
    pub fn external(&self, v: Var) -> Option<u32> {
        match self.int2ext.get(v) {
            Some(&e) if e != NO_EXT => Some(e as u32),
            _ => None,
        }
    }

    /// The external literal for an internal literal, keeping the sign.
    pub fn external_lit(&self, l: Lit) -> Option<Lit> {
        self.external(l.var())
            .map(|e| Lit::new(Var::from_idx(e), l.sign()))
    }

    /// The internal literal for an external literal, keeping the sign.
    pub fn internal_lit(&self, l: Lit) -> Result<Lit> {
        Ok(Lit::new(self.internal(l.var().idx())?, l.sign()))
    }

    /// DIMACS rendering of an internal literal: external var + 1, negated
    /// literals negative.
    pub fn dimacs(&self, l: Lit) -> i32 {
        let e = self
            .external(l.var())
            .expect("literal has no external id") as i32
            + 1;
        if l.sign() {
            e
        } else {
            -e
        }
    }

    /// Internal literal from a DIMACS integer (must be nonzero).
    pub fn from_dimacs(&self, d: i32) -> Result<Lit> {
        debug_assert_ne!(d, 0);
        let v = self.internal((d.abs() - 1) as u32)?;
        Ok(Lit::new(v, d > 0))
    }

    /// Associate a unique, printable-ASCII name with `v`.
    pub fn set_name(&mut self, v: Var, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        check_name(name)?;
        if self.names.contains_key(name) {
            return Err(Error::domain(format!(
                "all variable names must be unique; duplicate name: {}",
                name
            )));
        }
        self.names.insert(name.to_string(), v);
        self.name_of.insert(v, name.to_string(), String::new());
        self.named.push(v);
        Ok(())
    }

    pub fn has_name(&self, v: Var) -> bool {
        matches!(self.name_of.get(v), Some(n) if !n.is_empty())
    }

    /// The name of `v`, or the empty string.
    pub fn name(&self, v: Var) -> &str {
        match self.name_of.get(v) {
            Some(n) => n,
            None => "",
        }
    }

    pub fn var_by_name(&self, name: &str) -> Option<Var> {
        self.names.get(name).copied()
    }

    pub fn n_named(&self) -> usize {
        self.named.len()
    }

    pub fn named_at(&self, n: usize) -> Option<Var> {
        self.named.get(n).copied()
    }
}

impl Default for VarMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut m = VarMap::new();
        // internal vars 3 and 7 exposed; 5 stays auxiliary
        let a = Var::from_idx(3);
        let b = Var::from_idx(7);
        let ea = m.expose(a);
        let eb = m.expose(b);
        assert_eq!(ea, 0);
        assert_eq!(eb, 1);
        assert_eq!(m.expose(a), 0); // idempotent
        assert_eq!(m.internal(ea).unwrap(), a);
        assert_eq!(m.internal(eb).unwrap(), b);
        assert_eq!(m.external(Var::from_idx(5)), None);
        for &(v, e) in &[(a, ea), (b, eb)] {
            for &sign in &[true, false] {
                let l = Lit::new(v, sign);
                let el = m.external_lit(l).unwrap();
                assert_eq!(el, Lit::new(Var::from_idx(e), sign));
                assert_eq!(m.internal_lit(el).unwrap(), l);
            }
        }
    }

    #[test]
    fn test_dimacs() {
        let mut m = VarMap::new();
        let v = Var::from_idx(9);
        m.expose(v);
        assert_eq!(m.dimacs(Lit::new(v, true)), 1);
        assert_eq!(m.dimacs(Lit::new(v, false)), -1);
        assert_eq!(m.from_dimacs(-1).unwrap(), Lit::new(v, false));
    }

    #[test]
    fn test_names() {
        let mut m = VarMap::new();
        let v = Var::from_idx(0);
        m.expose(v);
        assert!(m.set_name(v, "x").is_ok());
        assert_eq!(m.var_by_name("x"), Some(v));
        let w = Var::from_idx(1);
        m.expose(w);
        assert!(m.set_name(w, "x").is_err()); // duplicate
        assert!(m.set_name(w, "bad name").is_err()); // whitespace
        assert_eq!(m.n_named(), 1);
    }
}
