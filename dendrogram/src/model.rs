//! Split likelihood and Metropolis-Hastings acceptance.
//!
//! # Likelihood of one internal node
//!
//! An internal node splits its leaves into a left group `L` and a right
//! group `R`. Every pair across the split is an independent Bernoulli
//! trial sharing one connection probability, estimated at its maximum:
//!
//! ```text
//! links     = #edges between L and R
//! max_links = |L| * |R|
//! theta     = links / max_links
//! lik       = theta^links * (1 - theta)^(max_links - links)
//! ```
//!
//! with the convention `0^0 = 1`.

/// Likelihood term of a split with `links` observed edges out of
/// `max_links` possible ones. Always in `[0, 1]`.
#[inline]
pub fn split_likelihood(links: usize, max_links: usize) -> f64 {
    debug_assert!(max_links >= 1);
    debug_assert!(links <= max_links);

    let theta = links as f64 / max_links as f64;
    pow_or_one(theta, links) * pow_or_one(1.0 - theta, max_links - links)
}

/// Natural log of [`split_likelihood`], finite where the product underflows
#[inline]
pub fn ln_split_likelihood(links: usize, max_links: usize) -> f64 {
    debug_assert!(max_links >= 1);
    debug_assert!(links <= max_links);

    let theta = links as f64 / max_links as f64;
    xlny(links, theta) + xlny(max_links - links, 1.0 - theta)
}

/// `base^exponent` with `base^0 = 1` for every base, zero included
#[inline]
fn pow_or_one(base: f64, exponent: usize) -> f64 {
    if exponent == 0 {
        1.0
    } else {
        base.powf(exponent as f64)
    }
}

/// `k * ln(p)` with `0 * ln(0) = 0`
#[inline]
fn xlny(k: usize, p: f64) -> f64 {
    if k == 0 {
        0.0
    } else {
        k as f64 * p.ln()
    }
}

/// Metropolis acceptance on raw likelihoods.
///
/// A candidate that beats the previous likelihood is always taken;
/// otherwise it is taken when the uniform draw `u` falls below the
/// ratio `candidate / previous`. No proposal-asymmetry correction is
/// applied.
///
/// * `candidate` - aggregate likelihood after the proposed move
/// * `previous` - aggregate likelihood before the move
/// * `u` - uniform draw in `[0, 1)`
#[inline]
pub fn metropolis_accept(candidate: f64, previous: f64, u: f64) -> bool {
    candidate > previous || u < candidate / previous
}
