use kube::CustomResourceExt;

use nephio_operator::{nfdeploy::NfDeploy, repository::Repository, token::Token};

fn main() {
    print!("{}", serde_yaml::to_string(&NfDeploy::crd()).unwrap());
    println!("---");
    print!("{}", serde_yaml::to_string(&Repository::crd()).unwrap());
    println!("---");
    print!("{}", serde_yaml::to_string(&Token::crd()).unwrap());
}
