use alloy::sol;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    function balanceOf(address owner) external view returns (uint256);
    function name() external view returns (string);
}
