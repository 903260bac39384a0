//! Distribution functions used by the tests
//!
//! F, chi-square and Student t come from `statrs`. The studentized range
//! distribution is not available there and is computed here with the
//! Copenhaver & Holland Gauss-Legendre scheme (AS 190 as used by R).

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, StudentsT};
use statrs::function::erf::erfc;
use statrs::function::gamma::ln_gamma;

/// Upper tail of F(d1, d2)
pub fn f_sf(x: f64, d1: f64, d2: f64) -> Option<f64> {
    let dist = FisherSnedecor::new(d1, d2).ok()?;
    Some(dist.sf(x))
}

/// Upper tail of chi-square(df)
pub fn chi_squared_sf(x: f64, df: f64) -> Option<f64> {
    let dist = ChiSquared::new(df).ok()?;
    Some(dist.sf(x))
}

/// Two-sided Student t critical value for confidence `level`
pub fn t_critical(level: f64, df: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some(dist.inverse_cdf(0.5 + level / 2.0))
}

/// Standard normal CDF
pub fn pnorm(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

const XLEG: [f64; 6] = [
    0.981560634246719250690549090149,
    0.904117256370474856678465866119,
    0.769902674194304687036893833213,
    0.587317954286617447296702418941,
    0.367831498998180193752691536644,
    0.125233408511468915472441369464,
];

const ALEG: [f64; 6] = [
    0.047175336386511827194615961485,
    0.106939325995318430960254718194,
    0.160078328543346226334652529543,
    0.203167426723065921749064455810,
    0.233492536538354808760849898925,
    0.249147045813402785000562436043,
];

const XLEGQ: [f64; 8] = [
    0.989400934991649932596154173450,
    0.944575023073232576077988415535,
    0.865631202387831743880467897712,
    0.755404408355003033895101194847,
    0.617876244402643748446671764049,
    0.458016777657227386342419442984,
    0.281603550779258913230460501460,
    0.950125098376374401853193354250e-1,
];

const ALEGQ: [f64; 8] = [
    0.271524594117540948517805724560e-1,
    0.622535239386478928628438369944e-1,
    0.951585116824927848099251076022e-1,
    0.124628971255533872052476282192,
    0.149595988816576732081501730547,
    0.169156519395002538189312079030,
    0.182603415044923588866763667969,
    0.189450610455068496285396723208,
];

/// Probability that the range of `cc` standard normals is below `w`,
/// raised to the number of ranges `rr`
fn wprob(w: f64, rr: f64, cc: f64) -> f64 {
    const NLEG: usize = 12;
    const IHALF: usize = 6;
    const C1: f64 = -30.0;
    const C2: f64 = -50.0;
    const C3: f64 = 60.0;
    const BB: f64 = 8.0;
    const WLAR: f64 = 3.0;
    const WINCR1: f64 = 2.0;
    const WINCR2: f64 = 3.0;

    let qsqz = w * 0.5;
    if qsqz >= BB {
        return 1.0;
    }

    let mut pr_w = 2.0 * pnorm(qsqz) - 1.0;
    pr_w = if pr_w >= (C2 / cc).exp() { pr_w.powf(cc) } else { 0.0 };

    let wincr = if w > WLAR { WINCR1 } else { WINCR2 };
    let mut blb = qsqz;
    let binc = (BB - qsqz) / wincr;
    let mut bub = blb + binc;
    let mut einsum = 0.0;
    let cc1 = cc - 1.0;

    let mut wi = 1.0;
    while wi <= wincr {
        let mut elsum = 0.0;
        let a = 0.5 * (bub + blb);
        let b = 0.5 * (bub - blb);

        for jj in 1..=NLEG {
            let (j, xx) = if IHALF < jj {
                let j = NLEG - jj + 1;
                (j, XLEG[j - 1])
            } else {
                (jj, -XLEG[jj - 1])
            };
            let ac = a + b * xx;
            let qexpo = ac * ac;
            if qexpo > C3 {
                break;
            }
            let pplus = 2.0 * pnorm(ac);
            let pminus = 2.0 * pnorm(ac - w);
            let rinsum = pplus * 0.5 - pminus * 0.5;
            if rinsum >= (C1 / cc1).exp() {
                elsum += ALEG[j - 1] * (-(0.5 * qexpo)).exp() * rinsum.powf(cc1);
            }
        }
        elsum *= (2.0 * b) * cc / (2.0 * std::f64::consts::PI).sqrt();
        einsum += elsum;
        blb = bub;
        bub += binc;
        wi += 1.0;
    }

    pr_w += einsum;
    if pr_w <= (C1 / rr).exp() {
        return 0.0;
    }
    pr_w.powf(rr).min(1.0)
}

/// CDF of the studentized range for `k` means and `df` error degrees of freedom
pub fn ptukey(q: f64, k: f64, df: f64) -> f64 {
    const NLEGQ: usize = 16;
    const IHALFQ: usize = 8;
    const EPS1: f64 = -30.0;
    const EPS2: f64 = 1.0e-14;
    let rr = 1.0;

    if q <= 0.0 || k < 2.0 || df < 2.0 || q.is_nan() {
        return 0.0;
    }
    if q.is_infinite() {
        return 1.0;
    }
    if df > 25000.0 {
        return wprob(q, rr, k);
    }

    let f2 = df * 0.5;
    let ulen: f64 = if df <= 100.0 {
        1.0
    } else if df <= 800.0 {
        0.5
    } else if df <= 5000.0 {
        0.25
    } else {
        0.125
    };
    let f2lf = f2 * df.ln() - df * std::f64::consts::LN_2 - ln_gamma(f2) + ulen.ln();
    let f21 = f2 - 1.0;
    let ff4 = df * 0.25;

    let mut ans = 0.0;
    for i in 1..=50 {
        let mut otsum = 0.0;
        let twa1 = (2 * i - 1) as f64 * ulen;

        for jj in 1..=NLEGQ {
            let (j, upper) = if IHALFQ < jj {
                (jj - IHALFQ - 1, true)
            } else {
                (jj - 1, false)
            };
            let offset = XLEGQ[j] * ulen;
            let t1 = if upper {
                f2lf + f21 * (twa1 + offset).ln() - (offset + twa1) * ff4
            } else {
                f2lf + f21 * (twa1 - offset).ln() + (offset - twa1) * ff4
            };
            if t1 >= EPS1 {
                let qsqz = if upper {
                    q * ((offset + twa1) * 0.5).sqrt()
                } else {
                    q * ((twa1 - offset) * 0.5).sqrt()
                };
                otsum += wprob(qsqz, rr, k) * ALEGQ[j] * t1.exp();
            }
        }

        if i as f64 * ulen >= 1.0 && otsum <= EPS2 {
            break;
        }
        ans += otsum;
    }

    ans.min(1.0)
}

/// Quantile of the studentized range, found by bisection on [`ptukey`]
pub fn qtukey(p: f64, k: f64, df: f64) -> Option<f64> {
    if !(0.0..1.0).contains(&p) || k < 2.0 || df < 2.0 {
        return None;
    }
    let mut lo = 0.0;
    let mut hi = 8.0;
    while ptukey(hi, k, df) < p {
        hi *= 2.0;
        if hi > 1.0e4 {
            return None;
        }
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if ptukey(mid, k, df) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1.0e-10 {
            break;
        }
    }
    Some(0.5 * (lo + hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f_sf() {
        // F(2, 6) = 27 has p exactly 0.001
        let p = f_sf(27.0, 2.0, 6.0).unwrap();
        assert!((p - 0.001).abs() < 1e-9, "p = {}", p);
        assert!(f_sf(1.0, 0.0, 6.0).is_none());
    }

    #[test]
    fn test_chi_squared_sf() {
        let p = chi_squared_sf(6.651583710407239, 1.0).unwrap();
        assert!((p - 0.009906773011363754).abs() < 1e-9);
    }

    #[test]
    fn test_t_critical() {
        let t = t_critical(0.95, 10.0).unwrap();
        assert!((t - 2.2281388519649385).abs() < 1e-6);
    }

    #[test]
    fn test_pnorm() {
        assert!((pnorm(0.0) - 0.5).abs() < 1e-15);
        assert!((pnorm(1.959963984540054) - 0.975).abs() < 1e-9);
    }

    #[test]
    fn test_ptukey_against_tables() {
        // Upper 5% points of the studentized range
        assert!((ptukey(3.877, 3.0, 10.0) - 0.95).abs() < 1e-3);
        assert!((ptukey(3.578, 3.0, 20.0) - 0.95).abs() < 1e-3);
        assert!((ptukey(3.958, 4.0, 20.0) - 0.95).abs() < 1e-3);
    }

    #[test]
    fn test_ptukey_tails() {
        assert_eq!(ptukey(0.0, 3.0, 10.0), 0.0);
        assert_eq!(ptukey(f64::INFINITY, 3.0, 10.0), 1.0);
        assert!(ptukey(50.0, 3.0, 10.0) > 0.999999);
        assert!(ptukey(1.0, 3.0, 10.0) < ptukey(2.0, 3.0, 10.0));
    }

    #[test]
    fn test_ptukey_adjusted_p_values() {
        let q = 3.0 / (1.0f64 / 3.0).sqrt();
        assert!((1.0 - ptukey(q, 3.0, 6.0) - 0.024229053412602286).abs() < 1e-6);
        let q = 6.0 / (1.0f64 / 3.0).sqrt();
        assert!((1.0 - ptukey(q, 3.0, 6.0) - 0.0007942179057295329).abs() < 1e-6);
    }

    #[test]
    fn test_qtukey() {
        let q = qtukey(0.95, 3.0, 6.0).unwrap();
        assert!((q - 4.339195476524765).abs() < 1e-5, "q = {}", q);
        assert!(qtukey(1.5, 3.0, 6.0).is_none());
    }
}
