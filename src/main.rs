use std::collections::BTreeMap;
use std::sync::Arc;

use curv::arithmetic::Converter;
use curv::elliptic::curves::{Point, Scalar, Secp256k1};
use curv::BigInt;

use liss_threshold_ecdsa::aggregator::{Aggregator, User};
use liss_threshold_ecdsa::cl::Config;
use liss_threshold_ecdsa::liss::{GroupConfig, Liss};
use liss_threshold_ecdsa::math::{fmod, mod_inv_prime};
use liss_threshold_ecdsa::mpc::{ChannelTransport, State};

#[tokio::main]
async fn main() {
    let n = BigInt::from_hex("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141")
        .unwrap();
    let configs = vec![
        GroupConfig { users: 3, threshold: 2 },
        GroupConfig { users: 3, threshold: 2 },
    ];
    let cl_config = Config {
        c: BigInt::from(1024),
        d: 40,
        p: n.clone(),
        safe_parameter: 1348,
        distribution_distance: 40,
    };

    println!("Generating CL parameters and running the LISS session...");
    let ((server_transport, server_rx), (user_transport, user_rx)) =
        ChannelTransport::pair("server", "user");
    let mut server = Liss::new_server(
        Arc::new(server_transport),
        server_rx,
        &configs,
        cl_config.clone(),
        Box::new(|old: State, new: State| println!("server session: {:?} -> {:?}", old, new)),
    )
    .unwrap();
    let mut user = Liss::new_user(
        Arc::new(user_transport),
        user_rx,
        &configs,
        cl_config,
        Box::new(|old: State, new: State| println!("user session:   {:?} -> {:?}", old, new)),
    )
    .unwrap();

    let (server_out, user_out) = tokio::join!(server.start(), user.start());
    server_out.unwrap();
    user_out.unwrap();
    let server_result = server.get_result().unwrap();
    let user_result = user.get_result().unwrap();

    let pk = server_result.public_key.clone();
    let h = pk.h().base();
    println!("-----------------------------------");
    println!("Joint CL public key h = ({}, {}, ...)", h.a(), h.b());

    // two signing parties split a toy signature for privKey = 101
    let k = BigInt::from(1100019879798798u64);
    let priv_key = BigInt::from(101);
    let message = BigInt::from(11231);
    let r_point = Point::<Secp256k1>::generator() * &Scalar::from_bigint(&k);
    let r = r_point.x_coord().unwrap();
    let ec_pubkey = Point::<Secp256k1>::generator() * &Scalar::from_bigint(&priv_key);
    let s = fmod(
        &(mod_inv_prime(&k, &n).unwrap() * (&message + &r * &priv_key)),
        &n,
    );
    let s1 = BigInt::from(298374927u64);
    let s2 = fmod(&(&s - &s1), &n);

    let proofs = vec![
        pk.build_consistency_proof(&s1, &r_point).unwrap(),
        pk.build_consistency_proof(&s2, &r_point).unwrap(),
    ];
    let mut aggregator = Aggregator::new(
        &configs,
        ec_pubkey.clone(),
        pk.clone(),
        r.clone(),
        message.clone(),
        proofs.clone(),
    )
    .unwrap();

    // just enough approvals: the first `threshold` users of each group
    for (group, config) in configs.iter().enumerate() {
        for user_idx in 0..config.threshold {
            let mut shares = BTreeMap::new();
            for (key, server_share) in &server_result.users[group][user_idx] {
                let user_share = &user_result.users[group][user_idx][key];
                shares.insert(key.clone(), &server_share.share + &user_share.share);
            }
            let approver = User::new(
                pk.clone(),
                ec_pubkey.clone(),
                r.clone(),
                message.clone(),
                proofs.clone(),
                shares,
            )
            .unwrap();
            aggregator
                .add(group, user_idx, approver.approve().unwrap())
                .unwrap();
        }
    }

    assert!(aggregator.is_enough());
    let s_out = aggregator.get_s().unwrap();
    aggregator.verify_signature(&s_out).unwrap();

    println!("-----------------------------------");
    println!("SignatureECDSA = {{\n\tr = {},\n\ts = {}\n}}", r, s_out);
    if s_out == s {
        println!("Aggregated signature matches the expected s!");
    } else {
        println!("Aggregation mismatch!!");
    }
}
