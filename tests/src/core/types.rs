use jit68_core::cpu::{CCR_C, CCR_N, CCR_V, CCR_Z};
use jit68_core::{CcMask, Cond, FunctionCode, RegSet, Size};

#[test]
fn size_fields() {
    assert_eq!(Size::from_bits(0), Some(Size::Byte));
    assert_eq!(Size::from_bits(1), Some(Size::Word));
    assert_eq!(Size::from_bits(2), Some(Size::Long));
    assert_eq!(Size::from_bits(3), None);
    assert_eq!(Size::from_bytes(4), Some(Size::Long));
    assert_eq!(Size::from_bytes(3), None);

    assert_eq!(Size::Word.bits(), 16);
    assert_eq!(Size::Byte.mask(), 0xFF);
    assert_eq!(Size::Long.msb(), 0x8000_0000);
}

#[test]
fn sign_extend() {
    assert_eq!(Size::Byte.sign_extend(0x80), 0xFFFF_FF80);
    assert_eq!(Size::Byte.sign_extend(0x17F), 0x7F);
    assert_eq!(Size::Word.sign_extend(0xFFFE), 0xFFFF_FFFE);
    assert_eq!(Size::Long.sign_extend(0x8000_0000), 0x8000_0000);
}

#[test]
fn cond_encoding() {
    assert_eq!(Cond::from_bits(0x6), Cond::Ne);
    assert_eq!(Cond::from_bits(0x1F), Cond::Le);
    for bits in 0..16 {
        let c = Cond::from_bits(bits);
        assert_eq!(c as u16, bits);
        assert_eq!(c.invert().invert(), c);
        assert_eq!(c.uses(), c.invert().uses());
    }
}

#[test]
fn cond_test_against_ccr() {
    for ccr in 0..32u32 {
        let c = ccr & CCR_C != 0;
        let v = ccr & CCR_V != 0;
        let z = ccr & CCR_Z != 0;
        let n = ccr & CCR_N != 0;
        assert_eq!(Cond::Hi.test(ccr), !c && !z);
        assert_eq!(Cond::Ge.test(ccr), n == v);
        assert_eq!(Cond::Gt.test(ccr), !z && n == v);
        assert_eq!(Cond::Le.test(ccr), z || n != v);
        for bits in 0..16 {
            let cond = Cond::from_bits(bits);
            assert_ne!(cond.test(ccr), cond.invert().test(ccr), "{cond:?} {ccr:#x}");
        }
    }
}

#[test]
fn cond_uses() {
    assert_eq!(Cond::True.uses(), CcMask::NONE);
    assert_eq!(Cond::Hi.uses(), CcMask::Z.union(CcMask::C));
    assert_eq!(Cond::Lt.uses(), CcMask::N.union(CcMask::V));
    assert_eq!(
        Cond::Gt.uses(),
        CcMask::N.union(CcMask::Z).union(CcMask::V)
    );
}

#[test]
fn cc_mask_ops() {
    let nz = CcMask::N.union(CcMask::Z);
    assert!(CcMask::NZVC.contains(nz));
    assert!(!nz.contains(CcMask::C));
    assert_eq!(CcMask::ALL.subtract(CcMask::NZVC), CcMask::X);
    assert_eq!(nz.intersect(CcMask::Z.union(CcMask::C)), CcMask::Z);
    assert!(nz.intersects(CcMask::N));
    assert!(CcMask::NONE.is_empty());
    assert_eq!(CcMask::from_raw(0xFF), CcMask::ALL);
    assert_eq!(format!("{:?}", CcMask::ALL), "CcMask(XNZVC)");
    assert_eq!(format!("{:?}", CcMask::Z.union(CcMask::C)), "CcMask(--Z-C)");
}

#[test]
fn function_codes() {
    assert_eq!(FunctionCode::from_sr(0x2700, true), FunctionCode::SupervisorProgram);
    assert_eq!(FunctionCode::from_sr(0x2700, false), FunctionCode::SupervisorData);
    assert_eq!(FunctionCode::from_sr(0x0000, true), FunctionCode::UserProgram);
    assert_eq!(FunctionCode::from_sr(0x001F, false), FunctionCode::UserData);
    assert_eq!(FunctionCode::SupervisorProgram as u8, 6);
}

#[test]
fn reg_set() {
    let s = RegSet::EMPTY.set(3).set(12).set(3);
    assert_eq!(s.count(), 2);
    assert!(s.contains(12));
    assert!(!s.clear(12).contains(12));
    assert_eq!(s.iter().collect::<Vec<_>>(), vec![3, 12]);
}
